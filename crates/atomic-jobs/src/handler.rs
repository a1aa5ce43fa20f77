//! Job handlers for each job type.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use atomic_core::{Job, JobType, ProgressEvent, ProgressSink};

/// Progress callback: `(percent, stage, message)`.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>, Option<&str>) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback. Percent is clamped to `0..=100`.
    pub fn report_progress(&self, percent: i32, stage: Option<&str>, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent.clamp(0, 100), stage, message);
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Get the note ID for this job, if any.
    pub fn note_id(&self) -> Option<Uuid> {
        self.job.note_id
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }

    /// A string field of the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload()?.get(key)?.as_str()
    }
}

/// Pipeline progress written straight into the job record.
impl ProgressSink for JobContext {
    fn emit(&self, event: ProgressEvent) {
        self.report_progress(
            i32::from(event.progress),
            Some(event.stage.as_str()),
            Some(&event.message),
        );
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed with an error message.
    Failed(String),
    /// Job should be retried.
    Retry(String),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use atomic_core::{JobStatus, PipelineStage};

    fn job(job_type: JobType, payload: Option<JsonValue>) -> Job {
        Job {
            id: Uuid::new_v4(),
            note_id: Some(Uuid::new_v4()),
            job_type,
            status: JobStatus::Running,
            priority: 5,
            payload,
            result: None,
            error_message: None,
            progress_percent: 0,
            progress_stage: None,
            progress_message: None,
            retry_count: 0,
            max_retries: 0,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    type Seen = Arc<Mutex<Vec<(i32, Option<String>, Option<String>)>>>;

    fn recording(ctx: JobContext) -> (JobContext, Seen) {
        let seen: Seen = Arc::default();
        let sink = seen.clone();
        let ctx = ctx.with_progress_callback(move |p, stage, msg| {
            sink.lock()
                .unwrap()
                .push((p, stage.map(String::from), msg.map(String::from)));
        });
        (ctx, seen)
    }

    #[test]
    fn test_job_context_accessors() {
        let job = job(
            JobType::YoutubeIngest,
            Some(serde_json::json!({"url": "https://youtu.be/dQw4w9WgXcQ", "n": 1})),
        );
        let ctx = JobContext::new(job.clone());
        assert_eq!(ctx.job_id(), job.id);
        assert_eq!(ctx.note_id(), job.note_id);
        assert_eq!(ctx.payload_str("url"), Some("https://youtu.be/dQw4w9WgXcQ"));
        assert_eq!(ctx.payload_str("n"), None);
        assert_eq!(ctx.payload_str("missing"), None);
    }

    #[test]
    fn test_report_progress_without_callback_is_noop() {
        let ctx = JobContext::new(job(JobType::ProcessNote, None));
        ctx.report_progress(50, Some("x"), None);
    }

    #[test]
    fn test_report_progress_clamps() {
        let (ctx, seen) = recording(JobContext::new(job(JobType::ProcessNote, None)));
        ctx.report_progress(140, None, None);
        ctx.report_progress(-3, None, None);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, 100);
        assert_eq!(seen[1].0, 0);
    }

    #[test]
    fn test_context_as_progress_sink() {
        let (ctx, seen) = recording(JobContext::new(job(JobType::ProcessNote, None)));
        ctx.emit(ProgressEvent::new(PipelineStage::Embedding, "Generating embeddings", 40));
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0],
            (40, Some("embedding".to_string()), Some("Generating embeddings".to_string()))
        );
    }

    struct Echo;

    #[async_trait]
    impl JobHandler for Echo {
        fn job_type(&self) -> JobType {
            JobType::ProcessNote
        }

        async fn execute(&self, ctx: JobContext) -> JobResult {
            ctx.report_progress(100, Some("complete"), Some("Done"));
            JobResult::Success(None)
        }
    }

    #[tokio::test]
    async fn test_default_can_handle_matches_job_type() {
        let handler = Echo;
        assert!(handler.can_handle(JobType::ProcessNote));
        assert!(!handler.can_handle(JobType::YoutubeIngest));

        let (ctx, seen) = recording(JobContext::new(job(JobType::ProcessNote, None)));
        assert!(handler.execute(ctx).await.is_success());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
