//! Submit/poll facade over the job queue for callers that cannot hold a
//! progress stream open.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};
use uuid::Uuid;

use atomic_core::{defaults, Error, Job, JobRepository, JobStatus, JobType, Result};

/// Client-visible job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl From<JobStatus> for PollStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => PollStatus::Queued,
            JobStatus::Running => PollStatus::Processing,
            JobStatus::Completed => PollStatus::Completed,
            JobStatus::Failed => PollStatus::Failed,
        }
    }
}

/// `{job_id, status, progress, stage, message, note_id?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPollResponse {
    pub job_id: Uuid,
    pub status: PollStatus,
    pub progress: i32,
    pub stage: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<Uuid>,
}

const STAGE_STARTING: &str = "starting";
const MESSAGE_STARTING: &str = "Initializing...";

impl JobPollResponse {
    /// Failed response used when the queue itself misbehaves.
    pub fn backend_error(job_id: Uuid, err: &Error) -> Self {
        Self {
            job_id,
            status: PollStatus::Failed,
            progress: 0,
            stage: "error".to_string(),
            message: format!("Error retrieving status: {err}"),
            note_id: None,
        }
    }

    fn from_job(job: &Job) -> Self {
        let mut response = Self {
            job_id: job.id,
            status: job.status.into(),
            progress: 0,
            stage: STAGE_STARTING.to_string(),
            message: MESSAGE_STARTING.to_string(),
            note_id: None,
        };

        match job.status {
            JobStatus::Pending => {}
            JobStatus::Running => {
                response.progress = job.progress_percent.clamp(0, 100);
                if let Some(stage) = &job.progress_stage {
                    response.stage = stage.clone();
                }
                if let Some(message) = &job.progress_message {
                    response.message = message.clone();
                }
            }
            JobStatus::Completed => {
                response.progress = 100;
                response.stage = "complete".to_string();
                response.message = "Processing complete!".to_string();
                response.note_id = job
                    .result
                    .as_ref()
                    .and_then(|r| r.get("note_id"))
                    .and_then(JsonValue::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .or(job.note_id);
            }
            JobStatus::Failed => {
                response.stage = "error".to_string();
                response.message = format!(
                    "Error: {}",
                    job.error_message.as_deref().unwrap_or("Unknown error")
                );
            }
        }
        response
    }
}

/// Maps pipeline runs onto durable jobs: submit, then poll.
#[derive(Clone)]
pub struct BackgroundJobAdapter {
    jobs: Arc<dyn JobRepository>,
}

impl BackgroundJobAdapter {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self { jobs }
    }

    /// Enqueue a job and return its id.
    pub async fn submit(
        &self,
        note_id: Uuid,
        job_type: JobType,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job_id = self
            .jobs
            .queue(Some(note_id), job_type, defaults::JOB_PRIORITY, payload)
            .await?;
        info!(
            subsystem = "jobs",
            component = "adapter",
            %job_id,
            %note_id,
            job_type = job_type.as_str(),
            "Job submitted"
        );
        Ok(job_id)
    }

    /// Enqueue a pipeline run for an existing note.
    pub async fn submit_process(&self, note_id: Uuid) -> Result<Uuid> {
        self.submit(note_id, JobType::ProcessNote, None).await
    }

    /// Enqueue a YouTube ingest filling the placeholder note `note_id`.
    pub async fn submit_youtube(&self, note_id: Uuid, url: &str) -> Result<Uuid> {
        self.submit(note_id, JobType::YoutubeIngest, Some(json!({ "url": url })))
            .await
    }

    /// Current state of a job. Unknown ids are `NotFound`; any other queue
    /// failure becomes a failed response rather than an error.
    pub async fn poll(&self, job_id: Uuid) -> Result<JobPollResponse> {
        match self.jobs.get(job_id).await {
            Ok(Some(job)) => Ok(JobPollResponse::from_job(&job)),
            Ok(None) => Err(Error::NotFound(format!("Job {job_id} not found"))),
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "adapter",
                    %job_id,
                    error = %e,
                    "Error retrieving job status"
                );
                Ok(JobPollResponse::backend_error(job_id, &e))
            }
        }
    }
}
