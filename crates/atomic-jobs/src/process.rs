//! Pipeline run for an existing note, as a background job.

use async_trait::async_trait;
use tracing::instrument;

use atomic_core::JobType;
use atomic_pipeline::PipelineOrchestrator;

use crate::handler::{JobContext, JobHandler, JobResult};

/// Runs the orchestrator against the job's note, writing progress into the
/// job record.
pub struct ProcessNoteHandler {
    orchestrator: PipelineOrchestrator,
}

impl ProcessNoteHandler {
    pub fn new(orchestrator: PipelineOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler for ProcessNoteHandler {
    fn job_type(&self) -> JobType {
        JobType::ProcessNote
    }

    #[instrument(skip(self, ctx), fields(
        subsystem = "jobs",
        component = "process_note",
        op = "execute",
        job_id = %ctx.job_id(),
    ))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(note_id) = ctx.note_id() else {
            return JobResult::Failed("Job has no note_id".to_string());
        };

        match self.orchestrator.run(note_id, &ctx).await {
            Ok(outcome) => match serde_json::to_value(&outcome) {
                Ok(value) => JobResult::Success(Some(value)),
                Err(e) => JobResult::Failed(format!("Failed to encode result: {e}")),
            },
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }
}
