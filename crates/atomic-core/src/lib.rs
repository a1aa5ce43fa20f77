//! # atomic-core
//!
//! Core types, traits, and abstractions for the atomic notes knowledge graph.
//!
//! This crate provides the foundational data structures, the error taxonomy,
//! the progress-event contract of the pipeline, and the trait seams that the
//! storage, inference and job crates implement.

pub mod defaults;
pub mod error;
pub mod models;
pub mod progress;
pub mod text;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use progress::{
    ChannelProgress, FnProgress, NoopProgress, PipelineStage, ProgressEvent, ProgressSink,
    ScaledProgress,
};
pub use text::prefix_chars;
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
