//! Error types for the atomic notes system.

use thiserror::Error;

/// Result type alias using the crate-wide Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for knowledge-graph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Entity not found
    #[error("Entity not found: {0}")]
    EntityNotFound(uuid::Uuid),

    /// Topic not found
    #[error("Topic not found: {0}")]
    TopicNotFound(uuid::Uuid),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Source identifier (e.g. a video URL) could not be resolved
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Entity or relationship extraction failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Audio transcription failed
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the "resource absent" family (404-equivalent).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::NoteNotFound(_)
                | Error::EntityNotFound(_)
                | Error::TopicNotFound(_)
        )
    }

    /// True when the caller supplied bad input (400-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::InvalidSource(_))
    }

    /// True when an upstream AI service (LLM, embeddings, transcription) failed.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Extraction(_)
                | Error::Embedding(_)
                | Error::Transcription(_)
                | Error::Inference(_)
                | Error::Request(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
