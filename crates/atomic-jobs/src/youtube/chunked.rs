//! Transcription of long audio files in fixed-duration chunks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use atomic_core::{defaults, Error, Result, TranscriptSegment};
use atomic_inference::{TranscriptionBackend, TranscriptionResult};

use crate::command::run_cmd_with_timeout;

const AUDIO_MIME: &str = "audio/mpeg";

/// Splits an audio file into consecutive chunks of `chunk_secs` seconds.
#[async_trait]
pub trait AudioSplitter: Send + Sync {
    /// Chunk files in timeline order.
    async fn split(&self, audio: &Path, chunk_secs: u64, out_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// [`AudioSplitter`] using ffmpeg's segment muxer.
#[derive(Debug, Clone)]
pub struct FfmpegSplitter {
    program: String,
    timeout_secs: u64,
}

impl Default for FfmpegSplitter {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            timeout_secs: defaults::MEDIA_CMD_TIMEOUT_SECS,
        }
    }
}

impl FfmpegSplitter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// `FFMPEG_PATH`, else `ffmpeg` on `PATH`.
    pub fn from_env() -> Self {
        match std::env::var(defaults::ENV_FFMPEG_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::new(path.trim()),
            _ => Self::default(),
        }
    }
}

#[async_trait]
impl AudioSplitter for FfmpegSplitter {
    async fn split(&self, audio: &Path, chunk_secs: u64, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let pattern = out_dir.join("chunk_%04d.mp3");
        run_cmd_with_timeout(
            Command::new(&self.program)
                .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
                .arg(audio)
                .args(["-f", "segment", "-segment_time"])
                .arg(chunk_secs.to_string())
                .args(["-c:a", "libmp3lame", "-b:a", "128k", "-reset_timestamps", "1"])
                .arg(&pattern),
            self.timeout_secs,
            Error::Transcription,
        )
        .await?;

        let mut chunks = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("chunk_") && name.ends_with(".mp3") {
                chunks.push(entry.path());
            }
        }
        // Zero-padded indices sort in timeline order.
        chunks.sort();
        if chunks.is_empty() {
            return Err(Error::Transcription("ffmpeg produced no chunks".to_string()));
        }
        Ok(chunks)
    }
}

/// Merge per-chunk results into one timeline. Chunk `i` starts at
/// `i * chunk_secs`, so its segments shift by that offset.
pub fn merge_chunks(chunks: Vec<TranscriptionResult>, chunk_secs: u64) -> TranscriptionResult {
    let mut texts = Vec::with_capacity(chunks.len());
    let mut segments = Vec::new();
    let mut language = None;
    let mut duration_secs = None;

    for (i, chunk) in chunks.into_iter().enumerate() {
        let offset = (i as u64 * chunk_secs) as f64;
        let text = chunk.full_text.trim();
        if !text.is_empty() {
            texts.push(text.to_string());
        }
        segments.extend(chunk.segments.into_iter().map(|s| TranscriptSegment {
            start_secs: s.start_secs + offset,
            end_secs: s.end_secs + offset,
            text: s.text,
        }));
        if language.is_none() {
            language = chunk.language;
        }
        if let Some(d) = chunk.duration_secs {
            duration_secs = Some(offset + d);
        }
    }

    TranscriptionResult {
        full_text: texts.join(" "),
        segments,
        language,
        duration_secs,
    }
}

/// Whole-file transcription below the upload limit, chunked above it.
#[derive(Clone)]
pub struct ChunkedTranscriber {
    backend: Arc<dyn TranscriptionBackend>,
    splitter: Arc<dyn AudioSplitter>,
    max_bytes: u64,
    chunk_secs: u64,
    language: String,
}

impl ChunkedTranscriber {
    pub fn new(backend: Arc<dyn TranscriptionBackend>, splitter: Arc<dyn AudioSplitter>) -> Self {
        Self {
            backend,
            splitter,
            max_bytes: defaults::TRANSCRIBE_MAX_BYTES,
            chunk_secs: defaults::TRANSCRIBE_CHUNK_SECS,
            language: defaults::TRANSCRIBE_LANGUAGE.to_string(),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_chunk_secs(mut self, chunk_secs: u64) -> Self {
        self.chunk_secs = chunk_secs.max(1);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    async fn transcribe_one(&self, path: &Path) -> Result<TranscriptionResult> {
        let bytes = tokio::fs::read(path).await?;
        self.backend
            .transcribe(&bytes, AUDIO_MIME, Some(&self.language))
            .await
    }

    /// Transcribe `audio`, writing any chunks under `work_dir`. `progress`
    /// receives 0-100 for this phase.
    #[instrument(skip_all, fields(subsystem = "jobs", component = "transcriber", op = "transcribe"))]
    pub async fn transcribe_file(
        &self,
        audio: &Path,
        work_dir: &Path,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<TranscriptionResult> {
        let size = tokio::fs::metadata(audio).await?.len();

        if size <= self.max_bytes {
            progress(10.0);
            let result = self.transcribe_one(audio).await?;
            progress(100.0);
            return Ok(result);
        }

        info!(
            size_bytes = size,
            max_bytes = self.max_bytes,
            chunk_secs = self.chunk_secs,
            "Audio above upload limit, transcribing in chunks"
        );
        let chunk_dir = work_dir.join("chunks");
        tokio::fs::create_dir_all(&chunk_dir).await?;
        let chunks = self.splitter.split(audio, self.chunk_secs, &chunk_dir).await?;

        let total = chunks.len();
        let mut results = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            progress(10.0 + (i as f64 / total as f64) * 80.0);
            let result = self.transcribe_one(chunk).await?;
            debug!(chunk = i, segments = result.segments.len(), "Chunk transcribed");
            results.push(result);
            if let Err(e) = tokio::fs::remove_file(chunk).await {
                debug!(chunk = i, error = %e, "Could not remove chunk file");
            }
        }
        progress(100.0);

        Ok(merge_chunks(results, self.chunk_secs))
    }
}
