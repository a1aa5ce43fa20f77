//! # atomic-pipeline
//!
//! The note-processing pipeline for the atomic notes knowledge graph.
//!
//! [`PipelineOrchestrator::run`] sequences extraction, batched embedding,
//! optional timestamp mapping and transactional graph persistence for one
//! note, reporting each transition through a [`ProgressSink`]. The live HTTP
//! path and the background job path observe the same event sequence through
//! their own sinks.
//!
//! ## Example
//!
//! ```ignore
//! use atomic_pipeline::{ChannelProgress, PipelineOrchestrator};
//!
//! let orchestrator = PipelineOrchestrator::new(notes, graph, oracle, embedder)
//!     .with_timestamp_mapper(mapper);
//!
//! let (sink, mut events) = ChannelProgress::channel();
//! let outcome = orchestrator.run(note_id, &sink).await?;
//! ```

pub mod guard;
pub mod orchestrator;

pub use guard::{RunLease, RunRegistry};
pub use orchestrator::{PipelineOrchestrator, PipelineOutcome};

// Re-export core types
pub use atomic_core::*;
