//! Centralized default constants for the atomic notes system.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (OpenAI).
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Embedding vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

/// Maximum inputs accepted by one embeddings request.
pub const EMBED_MAX_BATCH: usize = 2048;

/// Environment variable selecting `real`, `mock` or `mock-random` embeddings.
pub const ENV_EMBEDDING_MODE: &str = "EMBEDDING_MODE";

// =============================================================================
// GENERATION
// =============================================================================

/// Default chat model for extraction, relationship detection and summaries.
pub const GEN_MODEL: &str = "gpt-5-mini";

/// Default request timeout for OpenAI-compatible calls (seconds).
pub const OPENAI_TIMEOUT_SECS: u64 = 300;

/// Placeholder key shipped in sample `.env` files; treated as "not configured".
pub const OPENAI_PLACEHOLDER_KEY: &str = "your_openai_api_key";

// =============================================================================
// PIPELINE
// =============================================================================

/// Characters of note content sent as relationship-detection context.
pub const RELATIONSHIP_CONTEXT_CHARS: usize = 1000;

/// Transcript segments offered to the timestamp mapper.
pub const TIMESTAMP_MAX_SEGMENTS: usize = 50;

/// Characters of each segment offered to the timestamp mapper.
pub const TIMESTAMP_SEGMENT_TEXT_CHARS: usize = 100;

/// Transcript characters offered to the summarizer.
pub const SUMMARY_MAX_CHARS: usize = 15_000;

/// Relationship type used when the oracle omits one.
pub const DEFAULT_RELATIONSHIP_TYPE: &str = "related_to";

/// Relationship strength used when the oracle omits one.
pub const DEFAULT_RELATIONSHIP_STRENGTH: f32 = 0.5;

/// Entity type used when the oracle omits one.
pub const DEFAULT_ENTITY_TYPE: &str = "concept";

/// Entity name used when the oracle omits one.
pub const UNKNOWN_ENTITY_NAME: &str = "Unknown";

/// Display color for entity types without a dedicated color.
pub const DEFAULT_ENTITY_COLOR: &str = "#9CA3AF";

// =============================================================================
// SEARCH
// =============================================================================

/// Default result count for semantic search.
pub const SEARCH_LIMIT: i64 = 10;

/// Default minimum cosine similarity for semantic search.
pub const SEARCH_MIN_SIMILARITY: f64 = 0.5;

/// Default result count for related-entity lookups.
pub const RELATED_LIMIT: i64 = 5;

/// Default minimum cosine similarity for related-entity lookups.
pub const RELATED_MIN_SIMILARITY: f64 = 0.6;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP listen port.
pub const SERVER_PORT: u16 = 8000;

/// Default CORS origins (Vite dev server and a local frontend).
pub const CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

/// SSE keep-alive interval in seconds.
pub const SSE_KEEPALIVE_SECS: u64 = 15;

/// Default topic emoji.
pub const TOPIC_EMOJI: &str = "📚";

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Default maximum retries for failed jobs. Ingest jobs are not retried.
pub const JOB_MAX_RETRIES: i32 = 0;

/// Default job priority.
pub const JOB_PRIORITY: i32 = 5;

/// Default job worker poll interval in milliseconds.
pub const JOB_POLL_INTERVAL_MS: u64 = 1_000;

/// Default maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Wall-clock limit for an entire job run in seconds (30 minutes).
pub const JOB_TIMEOUT_SECS: u64 = 1_800;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// AUDIO INGEST
// =============================================================================

/// Audio files above this size are transcribed in chunks (25 MB).
pub const TRANSCRIBE_MAX_BYTES: u64 = 25 * 1024 * 1024;

/// Duration of each transcription chunk in seconds (10 minutes).
pub const TRANSCRIBE_CHUNK_SECS: u64 = 600;

/// Default transcription language.
pub const TRANSCRIBE_LANGUAGE: &str = "en";

/// Per-command timeout for external media tools (seconds).
pub const MEDIA_CMD_TIMEOUT_SECS: u64 = 900;

/// Environment variable for the Whisper transcription server URL.
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";

/// Default Whisper transcription server URL.
pub const DEFAULT_WHISPER_BASE_URL: &str = "https://api.openai.com";

/// Environment variable for the Whisper model name.
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";

/// Default Whisper model.
pub const DEFAULT_WHISPER_MODEL: &str = "whisper-1";

/// Environment variable for the yt-dlp binary.
pub const ENV_YTDLP_PATH: &str = "YTDLP_PATH";

/// Environment variable for the ffmpeg binary.
pub const ENV_FFMPEG_PATH: &str = "FFMPEG_PATH";
