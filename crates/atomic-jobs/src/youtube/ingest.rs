//! YouTube video to knowledge graph: download, transcribe, summarize, extract.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use atomic_core::{
    Error, FnProgress, JobType, NoteRepository, PipelineStage, ProgressEvent, Result,
    ScaledProgress, TranscriptSegment, TranscriptSummarizer, META_TRANSCRIPT_SEGMENTS,
};
use atomic_pipeline::{PipelineOrchestrator, PipelineOutcome};

use super::chunked::ChunkedTranscriber;
use super::source::{extract_video_id, AudioSource};
use crate::handler::{JobContext, JobHandler, JobResult};

const STAGE_DOWNLOAD: &str = "download";
const STAGE_TRANSCRIBE: &str = "transcribe";
const STAGE_SUMMARIZE: &str = "summarize";
const STAGE_EXTRACT: &str = "extract";

const INTERRUPTED: &str = "Ingest interrupted before completion (job timeout or shutdown)";

/// Restores a note's transcript and records the interruption when dropped
/// while armed. The writes run on a spawned task since `Drop` cannot await.
struct RestoreOnDrop {
    notes: Arc<dyn NoteRepository>,
    note_id: Uuid,
    transcript: Option<String>,
}

impl RestoreOnDrop {
    fn arm(notes: Arc<dyn NoteRepository>, note_id: Uuid, transcript: String) -> Self {
        Self {
            notes,
            note_id,
            transcript: Some(transcript),
        }
    }

    fn disarm(mut self) {
        self.transcript = None;
    }
}

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        let Some(transcript) = self.transcript.take() else {
            return;
        };
        let note_id = self.note_id;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%note_id, "No runtime left to restore transcript of interrupted ingest");
            return;
        };
        warn!(%note_id, "YouTube ingest interrupted, restoring transcript");
        let notes = self.notes.clone();
        runtime.spawn(async move {
            if let Err(e) = notes.update_content(note_id, &transcript).await {
                warn!(%note_id, error = %e, "Failed to restore transcript of interrupted ingest");
            }
            if let Err(e) = notes
                .merge_metadata(note_id, json!({ "error": INTERRUPTED }))
                .await
            {
                warn!(%note_id, error = %e, "Failed to record ingest interruption on note");
            }
        });
    }
}

/// Job handler for `youtube_ingest` jobs.
///
/// Fills the placeholder note created at submission: title and video metadata
/// after download, the full transcript and its segments after transcription,
/// summary and key topics after summarization. Extraction runs against the
/// summary; the note's content is the full transcript again afterwards,
/// whatever the outcome.
pub struct YoutubeIngestHandler {
    notes: Arc<dyn NoteRepository>,
    source: Arc<dyn AudioSource>,
    transcriber: ChunkedTranscriber,
    summarizer: Arc<dyn TranscriptSummarizer>,
    orchestrator: PipelineOrchestrator,
    work_root: Option<PathBuf>,
}

impl YoutubeIngestHandler {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        source: Arc<dyn AudioSource>,
        transcriber: ChunkedTranscriber,
        summarizer: Arc<dyn TranscriptSummarizer>,
        orchestrator: PipelineOrchestrator,
    ) -> Self {
        Self {
            notes,
            source,
            transcriber,
            summarizer,
            orchestrator,
            work_root: None,
        }
    }

    /// Parent directory for per-job scratch space (default: system temp).
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("atomic-youtube-");
        let dir = match &self.work_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn ingest(&self, ctx: &JobContext, note_id: Uuid, url: &str) -> Result<PipelineOutcome> {
        extract_video_id(url)?;
        if self.notes.fetch(note_id).await?.is_none() {
            return Err(Error::NoteNotFound(note_id));
        }
        // Removed on drop, on every exit path.
        let scratch = self.scratch_dir()?;

        ctx.report_progress(5, Some(STAGE_DOWNLOAD), Some("Downloading audio..."));
        let video = self.source.download(url, scratch.path()).await?;
        self.notes.update_title(note_id, &video.title).await?;
        self.notes
            .merge_metadata(
                note_id,
                json!({
                    "source": "youtube",
                    "video_id": video.video_id,
                    "uploader": video.uploader,
                    "thumbnail": video.thumbnail,
                    "url": url,
                    "duration": video.duration_seconds,
                }),
            )
            .await?;

        ctx.report_progress(
            15,
            Some(STAGE_TRANSCRIBE),
            Some("Transcribing audio with Whisper..."),
        );
        let on_transcribe = |p: f64| {
            ctx.report_progress(
                (15.0 + p * 0.4) as i32,
                Some(STAGE_TRANSCRIBE),
                Some(&format!("Transcribing... {}%", p.round() as i64)),
            );
        };
        let transcript = self
            .transcriber
            .transcribe_file(&video.audio_file, scratch.path(), &on_transcribe)
            .await?;
        self.notes
            .update_content(note_id, &transcript.full_text)
            .await?;

        // From here on the note content may be swapped for the summary. If
        // this future is dropped (job timeout, shutdown) the guard puts the
        // transcript back.
        let guard = RestoreOnDrop::arm(self.notes.clone(), note_id, transcript.full_text.clone());
        let outcome = self
            .summarize_and_extract(ctx, note_id, &transcript.full_text, &transcript.segments)
            .await;
        let restored = self.notes.update_content(note_id, &transcript.full_text).await;
        guard.disarm();

        match (outcome, restored) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Err(e), restored) => {
                if let Err(re) = restored {
                    warn!(%note_id, error = %re, "Failed to restore transcript after failed extraction");
                }
                Err(e)
            }
            (Ok(_), Err(re)) => Err(re),
        }
    }

    /// Segments, summary, then extraction against the summary. Leaves the
    /// summary as the note content; the caller restores the transcript.
    async fn summarize_and_extract(
        &self,
        ctx: &JobContext,
        note_id: Uuid,
        full_text: &str,
        segments: &[TranscriptSegment],
    ) -> Result<PipelineOutcome> {
        self.notes
            .merge_metadata(note_id, json!({ META_TRANSCRIPT_SEGMENTS: segments }))
            .await?;

        ctx.report_progress(60, Some(STAGE_SUMMARIZE), Some("Creating atomic summary..."));
        let summary = self.summarizer.summarize(full_text).await?;
        self.notes
            .merge_metadata(
                note_id,
                json!({ "summary": summary.summary, "key_topics": summary.key_topics }),
            )
            .await?;

        ctx.report_progress(
            70,
            Some(STAGE_EXTRACT),
            Some("Extracting entities and relationships..."),
        );
        let extraction_input = if summary.summary.trim().is_empty() {
            full_text
        } else {
            summary.summary.as_str()
        };
        self.notes.update_content(note_id, extraction_input).await?;

        self.extract(ctx, note_id).await
    }

    /// Orchestrator run reported as the 70-100% band of the job. Terminal
    /// errors are left to the job failure.
    async fn extract(&self, ctx: &JobContext, note_id: Uuid) -> Result<PipelineOutcome> {
        let phase = FnProgress(|event: ProgressEvent| {
            if event.stage != PipelineStage::Error {
                ctx.report_progress(
                    i32::from(event.progress),
                    Some(STAGE_EXTRACT),
                    Some(&event.message),
                );
            }
        });
        let scaled = ScaledProgress::new(&phase, 70, 30);
        self.orchestrator.run(note_id, &scaled).await
    }

    async fn record_failure(&self, note_id: Uuid, message: &str) {
        if let Err(e) = self
            .notes
            .merge_metadata(note_id, json!({ "error": message }))
            .await
        {
            warn!(%note_id, error = %e, "Failed to record ingest error on note");
        }
    }
}

#[async_trait]
impl JobHandler for YoutubeIngestHandler {
    fn job_type(&self) -> JobType {
        JobType::YoutubeIngest
    }

    #[instrument(skip(self, ctx), fields(
        subsystem = "jobs",
        component = "youtube_ingest",
        op = "execute",
        job_id = %ctx.job_id(),
    ))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(note_id) = ctx.note_id() else {
            return JobResult::Failed("Job has no note_id".to_string());
        };
        let Some(url) = ctx.payload_str("url").map(str::to_string) else {
            return JobResult::Failed("Job payload has no url".to_string());
        };

        match self.ingest(&ctx, note_id, &url).await {
            Ok(outcome) => {
                info!(
                    %note_id,
                    entity_count = outcome.entities,
                    relationship_count = outcome.relationships,
                    "YouTube ingest complete"
                );
                ctx.report_progress(100, Some("complete"), Some("Processing complete!"));
                JobResult::Success(Some(result_payload(note_id, &outcome)))
            }
            Err(e) => {
                let message = e.to_string();
                warn!(%note_id, error = %message, "YouTube ingest failed");
                if !matches!(e, Error::NoteNotFound(_)) {
                    self.record_failure(note_id, &message).await;
                }
                JobResult::Failed(message)
            }
        }
    }
}

fn result_payload(note_id: Uuid, outcome: &PipelineOutcome) -> JsonValue {
    json!({
        "status": "complete",
        "note_id": note_id,
        "entities": outcome.entities,
        "relationships": outcome.relationships,
    })
}
