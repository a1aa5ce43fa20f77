//! Worker end to end: submit through the adapter, run, poll.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use atomic_db::MemoryStore;
use atomic_inference::MockEmbedding;
use atomic_jobs::{
    BackgroundJobAdapter, CreateNoteRequest, DetectedRelationship, Error, ExtractedEntity,
    ExtractionOracle, JobContext, JobHandler, JobRepository, JobResult, JobType, NoteRepository,
    PollStatus, ProcessNoteHandler, Result, WorkerBuilder, WorkerConfig, WorkerEvent,
};
use atomic_pipeline::PipelineOrchestrator;

struct TwoEntityOracle;

#[async_trait]
impl ExtractionOracle for TwoEntityOracle {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        if text.contains("poison") {
            return Err(Error::Extraction("model returned garbage".to_string()));
        }
        Ok(vec![
            ExtractedEntity::new("Postgres", "technology", "database"),
            ExtractedEntity::new("pgvector", "technology", "vector extension"),
        ])
    }

    async fn detect_relationships(
        &self,
        _names: &[String],
        _context: &str,
    ) -> Result<Vec<DetectedRelationship>> {
        Ok(vec![DetectedRelationship {
            source: "pgvector".to_string(),
            target: "Postgres".to_string(),
            relationship_type: "extends".to_string(),
            strength: 0.8,
            explanation: Some("extension".to_string()),
        }])
    }
}

/// Reports one progress step, then sleeps.
struct SlowHandler(Duration);

#[async_trait]
impl JobHandler for SlowHandler {
    fn job_type(&self) -> JobType {
        JobType::YoutubeIngest
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(5, Some("download"), Some("Downloading audio..."));
        tokio::time::sleep(self.0).await;
        JobResult::Success(None)
    }
}

fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_poll_interval(10)
        .with_max_concurrent(2)
}

async fn note(store: &MemoryStore, content: &str) -> Uuid {
    NoteRepository::insert(
        store,
        CreateNoteRequest {
            title: "Storage".to_string(),
            content: content.to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

fn orchestrator(store: &MemoryStore) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(TwoEntityOracle),
        Arc::new(MockEmbedding::deterministic()),
    )
}

/// Collect events until `job_id` reaches a terminal event.
async fn until_terminal(
    events: &mut broadcast::Receiver<WorkerEvent>,
    job_id: Uuid,
) -> Vec<WorkerEvent> {
    let mut seen = Vec::new();
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = matches!(
                        &event,
                        WorkerEvent::JobCompleted { job_id: id, .. }
                            | WorkerEvent::JobFailed { job_id: id, .. } if *id == job_id
                    );
                    seen.push(event);
                    if done {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("job did not finish");
    seen
}

#[tokio::test]
async fn test_process_job_completes_and_polls_complete() {
    let store = MemoryStore::new();
    let note_id = note(&store, "pgvector extends Postgres with vector types.").await;
    let adapter = BackgroundJobAdapter::new(Arc::new(store.clone()));

    let worker = WorkerBuilder::new(Arc::new(store.clone()))
        .with_config(fast_config())
        .with_handler(ProcessNoteHandler::new(orchestrator(&store)))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let job_id = adapter.submit_process(note_id).await.unwrap();
    let seen = until_terminal(&mut events, job_id).await;

    assert!(matches!(seen.last(), Some(WorkerEvent::JobCompleted { .. })));
    let stages: Vec<String> = seen
        .iter()
        .filter_map(|e| match e {
            WorkerEvent::JobProgress { stage, .. } => stage.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(stages.first().map(String::as_str), Some("start"));
    assert_eq!(stages.last().map(String::as_str), Some("complete"));

    let poll = adapter.poll(job_id).await.unwrap();
    assert_eq!(poll.status, PollStatus::Completed);
    assert_eq!(poll.progress, 100);
    assert_eq!(poll.stage, "complete");
    assert_eq!(poll.note_id, Some(note_id));

    let job = store.get(job_id).await.unwrap().unwrap();
    let result = job.result.unwrap();
    assert_eq!(result["entities"], 2);
    assert_eq!(result["relationships"], 1);
    assert_eq!(store.entities_for_note(note_id).len(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_process_job_failure_polls_error() {
    let store = MemoryStore::new();
    let note_id = note(&store, "poison pill").await;
    let adapter = BackgroundJobAdapter::new(Arc::new(store.clone()));

    let worker = WorkerBuilder::new(Arc::new(store.clone()))
        .with_config(fast_config())
        .with_handler(ProcessNoteHandler::new(orchestrator(&store)))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let job_id = adapter.submit_process(note_id).await.unwrap();
    let seen = until_terminal(&mut events, job_id).await;

    match seen.last() {
        Some(WorkerEvent::JobFailed { error, .. }) => assert!(error.contains("garbage")),
        other => panic!("expected failure, got {other:?}"),
    }
    let poll = adapter.poll(job_id).await.unwrap();
    assert_eq!(poll.status, PollStatus::Failed);
    assert_eq!(poll.stage, "error");
    assert!(poll.message.starts_with("Error: "));
    assert!(poll.message.contains("garbage"));
    assert_eq!(store.entity_count(), 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_job_timeout_fails_job() {
    let store = MemoryStore::new();
    let note_id = note(&store, "placeholder").await;
    let adapter = BackgroundJobAdapter::new(Arc::new(store.clone()));

    let worker = WorkerBuilder::new(Arc::new(store.clone()))
        .with_config(fast_config().with_job_timeout(1))
        .with_handler(SlowHandler(Duration::from_secs(30)))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let job_id = adapter
        .submit_youtube(note_id, "https://youtu.be/dQw4w9WgXcQ")
        .await
        .unwrap();
    let seen = until_terminal(&mut events, job_id).await;

    match seen.last() {
        Some(WorkerEvent::JobFailed { error, .. }) => {
            assert_eq!(error, "Job exceeded timeout of 1s")
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let poll = adapter.poll(job_id).await.unwrap();
    assert_eq!(poll.status, PollStatus::Failed);
    assert_eq!(poll.message, "Error: Job exceeded timeout of 1s");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_running_job_polls_recorded_progress() {
    let store = MemoryStore::new();
    let note_id = note(&store, "placeholder").await;
    let adapter = BackgroundJobAdapter::new(Arc::new(store.clone()));

    let worker = WorkerBuilder::new(Arc::new(store.clone()))
        .with_config(fast_config())
        .with_handler(SlowHandler(Duration::from_millis(500)))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let job_id = adapter
        .submit_youtube(note_id, "https://youtu.be/dQw4w9WgXcQ")
        .await
        .unwrap();

    // Wait for the progress write, then poll while the handler sleeps.
    let progressed = async {
        loop {
            if let Ok(WorkerEvent::JobProgress { job_id: id, .. }) = events.recv().await {
                if id == job_id {
                    break;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), progressed)
        .await
        .expect("no progress event");

    let poll = adapter.poll(job_id).await.unwrap();
    assert_eq!(poll.status, PollStatus::Processing);
    assert_eq!(poll.progress, 5);
    assert_eq!(poll.stage, "download");
    assert_eq!(poll.message, "Downloading audio...");

    until_terminal(&mut events, job_id).await;
    assert_eq!(adapter.poll(job_id).await.unwrap().status, PollStatus::Completed);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let store = MemoryStore::new();
    let adapter = BackgroundJobAdapter::new(Arc::new(store));
    let err = adapter.poll(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
