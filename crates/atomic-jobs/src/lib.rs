//! # atomic-jobs
//!
//! Background job processing for the atomic notes knowledge graph.
//!
//! This crate provides:
//! - A polling worker that claims queued jobs and runs them concurrently
//! - Progress written into the job record and broadcast as events
//! - The submit/poll adapter used by clients that cannot hold a stream open
//! - Handlers for note processing and YouTube ingestion
//!
//! ## Example
//!
//! ```ignore
//! use atomic_jobs::{ProcessNoteHandler, WorkerBuilder, WorkerConfig};
//!
//! let worker = WorkerBuilder::new(stores.jobs.clone())
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(ProcessNoteHandler::new(orchestrator.clone()))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod adapter;
pub mod command;
pub mod handler;
pub mod process;
pub mod worker;
pub mod youtube;

// Re-export core types
pub use atomic_core::*;

pub use adapter::{BackgroundJobAdapter, JobPollResponse, PollStatus};
pub use handler::{JobContext, JobHandler, JobResult};
pub use process::ProcessNoteHandler;
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
pub use youtube::{
    extract_video_id, AudioSource, AudioSplitter, ChunkedTranscriber, FfmpegSplitter, VideoInfo,
    YoutubeIngestHandler, YtDlpSource,
};

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = atomic_core::defaults::JOB_POLL_INTERVAL_MS;
