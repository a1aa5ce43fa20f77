//! Embedding provider selection.

use std::sync::Arc;

use tracing::{info, warn};

use atomic_core::{defaults, EmbeddingBackend, Error, Result};

use crate::mock::MockEmbedding;
use crate::openai::{api_key_from_env, OpenAIBackend, OpenAIConfig};

/// Which embedding source the process uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// The configured OpenAI-compatible service.
    Real,
    /// Deterministic hash-seeded vectors.
    Mock,
    /// Non-repeatable vectors for load testing.
    MockRandom,
}

impl EmbeddingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real" | "openai" => Some(Self::Real),
            "mock" => Some(Self::Mock),
            "mock-random" | "mock_random" => Some(Self::MockRandom),
            _ => None,
        }
    }

    /// `EMBEDDING_MODE` if set, else `Real` when an API key is configured and
    /// `Mock` otherwise.
    pub fn from_env() -> Result<Self> {
        resolve_mode(
            std::env::var(defaults::ENV_EMBEDDING_MODE).ok().as_deref(),
            api_key_from_env().is_some(),
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Mock => "mock",
            Self::MockRandom => "mock-random",
        }
    }
}

fn resolve_mode(raw: Option<&str>, has_api_key: bool) -> Result<EmbeddingMode> {
    match raw.filter(|s| !s.trim().is_empty()) {
        Some(value) => EmbeddingMode::parse(value).ok_or_else(|| {
            Error::Config(format!(
                "{} must be one of real, mock, mock-random (got '{}')",
                defaults::ENV_EMBEDDING_MODE,
                value
            ))
        }),
        None if has_api_key => Ok(EmbeddingMode::Real),
        None => Ok(EmbeddingMode::Mock),
    }
}

/// Build the embedding backend for `mode`.
pub fn embedding_backend(mode: EmbeddingMode, config: OpenAIConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    let backend: Arc<dyn EmbeddingBackend> = match mode {
        EmbeddingMode::Real => {
            if config.api_key.is_none() {
                warn!(
                    subsystem = "inference",
                    component = "embedding",
                    base_url = %config.base_url,
                    "Real embedding mode without an API key; only keyless endpoints will work"
                );
            }
            Arc::new(OpenAIBackend::new(config)?)
        }
        EmbeddingMode::Mock => Arc::new(MockEmbedding::deterministic().with_dimension(config.embed_dimension)),
        EmbeddingMode::MockRandom => Arc::new(MockEmbedding::random().with_dimension(config.embed_dimension)),
    };
    info!(
        subsystem = "inference",
        component = "embedding",
        mode = mode.as_str(),
        model = backend.model_name(),
        "Embedding provider selected"
    );
    Ok(backend)
}
