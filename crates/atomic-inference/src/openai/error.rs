//! OpenAI-specific error classification.

use atomic_core::Error;

/// Failure classes of an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    AuthenticationError,
    RateLimitExceeded,
    ModelNotFound,
    ContextLengthExceeded,
    ServerError,
    Unknown,
}

impl OpenAIErrorCode {
    /// Classify from HTTP status and the error `type`/`code` field.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "authentication failed",
            Self::RateLimitExceeded => "rate limit exceeded",
            Self::ModelNotFound => "model not found",
            Self::ContextLengthExceeded => "context too long",
            Self::ServerError => "server error",
            Self::Unknown => "request failed",
        }
    }
}

/// Which caller-facing error a failed call becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Embedding,
    Generation,
}

/// Map a classified upstream failure onto the crate error taxonomy.
///
/// Authentication and unknown-model failures are configuration problems;
/// everything else is reported under the operation's own variant.
pub fn to_atomic_error(op: Operation, code: OpenAIErrorCode, message: &str) -> Error {
    let text = format!("{}: {}", code.label(), message);
    match (code, op) {
        (OpenAIErrorCode::AuthenticationError | OpenAIErrorCode::ModelNotFound, _) => {
            Error::Config(text)
        }
        (_, Operation::Embedding) => Error::Embedding(text),
        (_, Operation::Generation) => Error::Inference(text),
    }
}
