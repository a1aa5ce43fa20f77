//! Core traits for the knowledge-graph abstractions.
//!
//! Storage, inference and oracle seams are traits so the pipeline can run
//! against PostgreSQL and live AI services in production and against
//! in-memory stores and scripted stubs in tests.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// NOTE REPOSITORY TRAITS
// =============================================================================

/// Repository for note CRUD operations.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note, returning its id.
    async fn insert(&self, req: CreateNoteRequest) -> Result<Uuid>;

    /// Fetch a note by id.
    async fn fetch(&self, id: Uuid) -> Result<Option<Note>>;

    /// List notes newest first with entity counts (single aggregate query).
    async fn list(&self) -> Result<Vec<NoteSummary>>;

    /// Replace a note's content.
    async fn update_content(&self, id: Uuid, content: &str) -> Result<()>;

    /// Replace a note's title.
    async fn update_title(&self, id: Uuid, title: &str) -> Result<()>;

    /// Shallow-merge a JSON object into the note's metadata.
    async fn merge_metadata(&self, id: Uuid, patch: JsonValue) -> Result<()>;
}

// =============================================================================
// GRAPH PERSISTENCE TRAITS
// =============================================================================

/// Transactional graph storage.
///
/// Writes of a pipeline run go through one [`GraphTransaction`]; nothing is
/// visible to readers until it commits.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Open a transaction for one pipeline run.
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>>;

    /// Entities of a note plus the relationships among them.
    async fn note_graph(&self, note_id: Uuid) -> Result<Graph>;

    /// Entities of every note in a topic plus the relationships among them.
    async fn topic_graph(&self, topic_id: Uuid) -> Result<Graph>;

    /// Delete a note, its entities, their relationships and annotations in
    /// one transaction. Relationships go first, then entities, then the note.
    async fn delete_note_cascade(&self, note_id: Uuid) -> Result<CascadeDeleteSummary>;

    /// Fetch one entity.
    async fn fetch_entity(&self, entity_id: Uuid) -> Result<Option<Entity>>;
}

/// Staged, uncommitted writes of a single pipeline run.
#[async_trait]
pub trait GraphTransaction: Send {
    /// Remove the note's previous entities, relationships and annotations.
    async fn clear_note_graph(&mut self, note_id: Uuid) -> Result<()>;

    /// Attach the note-level embedding.
    async fn set_note_embedding(&mut self, note_id: Uuid, embedding: &Vector) -> Result<()>;

    /// Stage entities owned by `note_id`; returns ids in input order.
    async fn save_entities(&mut self, note_id: Uuid, entities: &[NewEntity]) -> Result<Vec<Uuid>>;

    /// Stage relationships; returns ids in input order.
    async fn save_relationships(&mut self, relationships: &[NewRelationship]) -> Result<Vec<Uuid>>;

    /// Make every staged write visible atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every staged write.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

// =============================================================================
// TOPIC & ANNOTATION TRAITS
// =============================================================================

/// Repository for topics.
#[async_trait]
pub trait TopicRepository: Send + Sync {
    async fn create(&self, req: CreateTopicRequest) -> Result<Topic>;
    async fn list(&self) -> Result<Vec<Topic>>;
    async fn fetch(&self, id: Uuid) -> Result<Option<Topic>>;
}

/// Repository for entity annotations.
#[async_trait]
pub trait AnnotationRepository: Send + Sync {
    /// Create an annotation; fails with `EntityNotFound` if the entity is absent.
    async fn create(&self, entity_id: Uuid, user_note: &str) -> Result<Annotation>;

    /// Annotations of an entity, newest first.
    async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<Annotation>>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Annotation>>;

    /// Update the note text; returns `None` when the annotation is absent.
    async fn update(&self, id: Uuid, user_note: &str) -> Result<Option<Annotation>>;

    /// Delete; returns false when the annotation is absent.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

// =============================================================================
// VECTOR SEARCH TRAITS
// =============================================================================

/// Ranked k-nearest-neighbour lookups by cosine distance, plus the substring
/// fallback used when vector search is unavailable.
#[async_trait]
pub trait VectorSearchRepository: Send + Sync {
    /// Entities with `1 - cosine_distance >= min_similarity`, nearest first.
    async fn search_entities(
        &self,
        query: &Vector,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<EntityMatch>>;

    /// Notes with `1 - cosine_distance >= min_similarity`, nearest first.
    async fn search_notes(
        &self,
        query: &Vector,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<NoteMatch>>;

    /// Entities nearest to `entity_id`'s embedding, excluding itself.
    /// Empty when the entity is absent or has no embedding.
    async fn related_entities(
        &self,
        entity_id: Uuid,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<EntityMatch>>;

    /// Case-insensitive substring match over entity name/description.
    async fn text_search_entities(&self, query: &str, limit: i64) -> Result<Vec<EntityMatch>>;

    /// Case-insensitive substring match over note title/content.
    async fn text_search_notes(&self, query: &str, limit: i64) -> Result<Vec<NoteMatch>>;
}

/// Rows that never received an embedding, and single-row writes to fill them.
///
/// Used by the maintenance backfill, outside any pipeline transaction.
#[async_trait]
pub trait EmbeddingBackfillRepository: Send + Sync {
    /// Up to `limit` entities with a NULL embedding, oldest first.
    async fn entities_missing_embedding(&self, limit: i64) -> Result<Vec<Entity>>;

    /// Up to `limit` notes with a NULL embedding, oldest first.
    async fn notes_missing_embedding(&self, limit: i64) -> Result<Vec<Note>>;

    /// Fails with `EntityNotFound` when the entity is gone.
    async fn set_entity_embedding(&self, entity_id: Uuid, embedding: &Vector) -> Result<()>;

    /// Fails with `NoteNotFound` when the note is gone.
    async fn set_note_embedding(&self, note_id: Uuid, embedding: &Vector) -> Result<()>;
}

// =============================================================================
// JOB QUEUE TRAITS
// =============================================================================

/// Durable job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(
        &self,
        note_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Claim the highest-priority pending job of the given types (any type when empty).
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Record progress on a running job.
    async fn update_progress(
        &self,
        job_id: Uuid,
        percent: i32,
        stage: Option<&str>,
        message: Option<&str>,
    ) -> Result<()>;

    /// Mark a job completed with an optional result payload.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Mark a job failed (or back to pending while retries remain).
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Fetch a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Number of pending jobs.
    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns one vector per input text, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate a response constrained to a single JSON object.
    ///
    /// Backends without a JSON mode fall back to plain generation; callers
    /// still parse defensively.
    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_system(system, prompt).await
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// ORACLE TRAITS
// =============================================================================

/// LLM-backed structured extraction.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Extract entities from note text. An empty list is a valid answer.
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>>;

    /// Propose relationships among the named entities.
    async fn detect_relationships(
        &self,
        entity_names: &[String],
        context: &str,
    ) -> Result<Vec<DetectedRelationship>>;
}

/// Maps entity names onto transcript offsets.
#[async_trait]
pub trait TimestampMapper: Send + Sync {
    async fn map_timestamps(
        &self,
        entity_names: &[String],
        segments: &[TranscriptSegment],
    ) -> Result<TimestampMap>;
}

/// Condenses a transcript into an atomic summary and key topics.
#[async_trait]
pub trait TranscriptSummarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<TranscriptSummary>;
}
