//! # atomic-inference
//!
//! AI service backends for the atomic notes pipeline.
//!
//! This crate provides:
//! - An OpenAI-compatible backend for embeddings and JSON-mode chat
//! - A deterministic mock embedder and embedding-mode selection
//! - The LLM-backed extraction oracle, timestamp mapper and summarizer
//! - A Whisper-compatible transcription backend

pub mod embedding;
pub mod json;
pub mod mock;
pub mod openai;
pub mod oracle;
pub mod summarizer;
pub mod timestamps;
pub mod transcription;

pub use embedding::{embedding_backend, EmbeddingMode};
pub use mock::{mock_embedding, MockEmbedding, MockMode, ScriptedCall, ScriptedGeneration};
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use oracle::LlmExtractionOracle;
pub use summarizer::LlmSummarizer;
pub use timestamps::LlmTimestampMapper;
pub use transcription::{TranscriptionBackend, TranscriptionResult, WhisperBackend};

// Re-export core types
pub use atomic_core::*;
