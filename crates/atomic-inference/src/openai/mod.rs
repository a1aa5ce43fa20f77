//! OpenAI-compatible inference backend.
//!
//! Works with any endpoint speaking the OpenAI `/embeddings` and
//! `/chat/completions` protocol (OpenAI, Azure OpenAI, vLLM, Ollama's
//! compatibility mode).
//!
//! # Example
//!
//! ```rust,no_run
//! use atomic_inference::openai::{OpenAIBackend, OpenAIConfig};
//! use atomic_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::new(OpenAIConfig {
//!         base_url: "http://localhost:11434/v1".to_string(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//!     let texts = vec!["Hello, world!".to_string()];
//!     let vectors = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{api_key_from_env, OpenAIBackend, OpenAIConfig, DEFAULT_OPENAI_URL};
pub use error::{to_atomic_error, OpenAIErrorCode, Operation};
pub use types::*;
