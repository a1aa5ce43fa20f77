//! Domain models for notes, entities, relationships, topics and jobs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use pgvector::Vector;

use crate::defaults;

// =============================================================================
// NOTES
// =============================================================================

/// A note: free-form text that is the input to one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub source_file: Option<String>,
    /// Free-form metadata (transcript segments, summary, source URL, error state).
    pub note_metadata: JsonValue,
    pub topic_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Option<Vector>,
}

impl Note {
    /// Transcript segments stored under `note_metadata.transcript_segments`.
    ///
    /// Returns an empty list when the note is not transcript-derived or the
    /// stored value does not parse.
    pub fn transcript_segments(&self) -> Vec<TranscriptSegment> {
        self.note_metadata
            .get(META_TRANSCRIPT_SEGMENTS)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

/// Metadata key for transcript segments.
pub const META_TRANSCRIPT_SEGMENTS: &str = "transcript_segments";

/// Note listing row with its entity count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub entity_count: i64,
    pub note_metadata: JsonValue,
    pub topic_id: Option<Uuid>,
}

/// Request to create a note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub topic_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

/// Outcome of a cascading note delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeDeleteSummary {
    pub note_id: Uuid,
    pub title: String,
    pub entities_deleted: u64,
    pub relationships_deleted: u64,
}

// =============================================================================
// ENTITIES & RELATIONSHIPS
// =============================================================================

/// A persisted entity owned by exactly one note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub note_id: Uuid,
    pub name: String,
    pub entity_type: String,
    pub description: Option<String>,
    pub color: String,
    /// Seconds into the source audio, for transcript-derived notes.
    pub timestamp: Option<i32>,
    #[serde(skip)]
    pub embedding: Option<Vector>,
}

impl Entity {
    /// Same text the pipeline embeds at extraction time, with a missing
    /// description read as empty.
    pub fn embedding_text(&self) -> String {
        format!("{} - {}", self.name, self.description.as_deref().unwrap_or(""))
    }
}

/// A persisted directed edge between two entities of the same run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    pub relationship_type: String,
    pub strength: f32,
    pub ai_explanation: Option<String>,
}

/// Entity row staged by the pipeline's entity-save stage.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub color: String,
    pub embedding: Option<Vector>,
    pub timestamp: Option<i32>,
}

/// Relationship row staged by the pipeline's relationship-save stage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRelationship {
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    pub relationship_type: String,
    pub strength: f32,
    pub explanation: Option<String>,
}

/// An entity as returned by the extraction oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub color: String,
}

impl ExtractedEntity {
    /// Build an entity with normalized type and its display color.
    pub fn new(name: impl Into<String>, entity_type: &str, description: impl Into<String>) -> Self {
        let entity_type = entity_type.to_lowercase();
        Self {
            name: name.into(),
            color: entity_color(&entity_type).to_string(),
            entity_type,
            description: description.into(),
        }
    }

    /// Text embedded for this entity: `"{name} - {description}"`.
    pub fn embedding_text(&self) -> String {
        format!("{} - {}", self.name, self.description)
    }
}

/// A relationship proposed by the oracle, referencing entities by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRelationship {
    pub source: String,
    pub target: String,
    pub relationship_type: String,
    pub strength: f32,
    pub explanation: Option<String>,
}

/// Static entity type → display color lookup.
pub fn entity_color(entity_type: &str) -> &'static str {
    match entity_type {
        "concept" => "#FF70A6",
        "technology" => "#FF9770",
        "idea" => "#FFD670",
        "person" => "#70E0FF",
        "technique" => "#A770FF",
        "architecture" => "#70FFB9",
        "pattern" => "#FF70DD",
        "tool" => "#70A7FF",
        _ => defaults::DEFAULT_ENTITY_COLOR,
    }
}

/// Coerce an oracle-provided strength into [0, 1]. NaN maps to the default.
pub fn clamp_strength(strength: f32) -> f32 {
    if strength.is_nan() {
        defaults::DEFAULT_RELATIONSHIP_STRENGTH
    } else {
        strength.clamp(0.0, 1.0)
    }
}

// =============================================================================
// TRANSCRIPTS
// =============================================================================

/// A timestamped piece of a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    #[serde(alias = "start")]
    pub start_secs: f64,
    #[serde(alias = "end")]
    pub end_secs: f64,
    pub text: String,
}

/// Summary produced for a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSummary {
    pub summary: String,
    #[serde(default)]
    pub key_topics: Vec<String>,
}

/// Entity name → seconds into the source audio.
pub type TimestampMap = HashMap<String, i32>;

// =============================================================================
// GRAPH PROJECTION
// =============================================================================

/// Graph node as served to visualization clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: Option<String>,
    pub color: String,
    pub timestamp: Option<i32>,
}

impl From<Entity> for GraphNode {
    fn from(e: Entity) -> Self {
        Self {
            id: e.id,
            name: e.name,
            entity_type: e.entity_type,
            description: e.description,
            color: e.color,
            timestamp: e.timestamp,
        }
    }
}

/// Graph edge as served to visualization clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub id: Uuid,
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub strength: f32,
    pub explanation: Option<String>,
}

impl From<Relationship> for GraphEdge {
    fn from(r: Relationship) -> Self {
        Self {
            id: r.id,
            source_entity_id: r.source_entity_id,
            target_entity_id: r.target_entity_id,
            relationship_type: r.relationship_type,
            strength: r.strength,
            explanation: r.ai_explanation,
        }
    }
}

/// Read-only projection of entities and the relationships among them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    pub entities: Vec<GraphNode>,
    pub relationships: Vec<GraphEdge>,
}

// =============================================================================
// TOPICS & ANNOTATIONS
// =============================================================================

/// Optional grouping of notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTopicRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
}

/// A user note attached to an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub user_note: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// SEARCH
// =============================================================================

/// Collection targeted by a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTarget {
    #[default]
    Entities,
    Notes,
}

/// An entity hit with its cosine similarity (absent in text fallback mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMatch {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// A note hit with its cosine similarity (absent in text fallback mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteMatch {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub topic_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

// =============================================================================
// JOBS
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Run the extraction pipeline for an existing note
    ProcessNote,
    /// Download, transcribe, summarize and extract a YouTube video
    YoutubeIngest,
}

impl JobType {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ProcessNote => "process_note",
            JobType::YoutubeIngest => "youtube_ingest",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "process_note" => Some(JobType::ProcessNote),
            "youtube_ingest" => Some(JobType::YoutubeIngest),
            _ => None,
        }
    }
}

impl JobStatus {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub note_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub progress_percent: i32,
    pub progress_stage: Option<String>,
    pub progress_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_color_lookup() {
        assert_eq!(entity_color("concept"), "#FF70A6");
        assert_eq!(entity_color("tool"), "#70A7FF");
        assert_eq!(entity_color("spaceship"), "#9CA3AF");
    }

    #[test]
    fn test_extracted_entity_lowercases_type() {
        let e = ExtractedEntity::new("Rust", "Technology", "A systems language");
        assert_eq!(e.entity_type, "technology");
        assert_eq!(e.color, "#FF9770");
        assert_eq!(e.embedding_text(), "Rust - A systems language");
    }

    #[test]
    fn test_stored_entity_embedding_text_matches_extraction() {
        let extracted = ExtractedEntity::new("Rust", "Technology", "A systems language");
        let mut stored = Entity {
            id: Uuid::nil(),
            note_id: Uuid::nil(),
            name: extracted.name.clone(),
            entity_type: extracted.entity_type.clone(),
            description: Some(extracted.description.clone()),
            color: extracted.color.clone(),
            timestamp: None,
            embedding: None,
        };
        assert_eq!(stored.embedding_text(), extracted.embedding_text());

        stored.description = None;
        assert_eq!(stored.embedding_text(), "Rust - ");
    }

    #[test]
    fn test_clamp_strength() {
        assert_eq!(clamp_strength(1.7), 1.0);
        assert_eq!(clamp_strength(-0.2), 0.0);
        assert_eq!(clamp_strength(0.9), 0.9);
        assert_eq!(clamp_strength(f32::NAN), 0.5);
    }

    #[test]
    fn test_transcript_segment_accepts_short_keys() {
        let seg: TranscriptSegment =
            serde_json::from_str(r#"{"start": 1.5, "end": 3.0, "text": "hi"}"#).unwrap();
        assert_eq!(seg.start_secs, 1.5);
        assert_eq!(seg.end_secs, 3.0);
    }

    #[test]
    fn test_note_transcript_segments_from_metadata() {
        let note = Note {
            id: Uuid::nil(),
            title: "t".into(),
            content: "c".into(),
            source_file: None,
            note_metadata: serde_json::json!({
                "transcript_segments": [
                    {"start_secs": 0.0, "end_secs": 2.0, "text": "a"},
                    {"start_secs": 2.0, "end_secs": 4.0, "text": "b"}
                ]
            }),
            topic_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            embedding: None,
        };
        let segs = note.transcript_segments();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].text, "b");
    }

    #[test]
    fn test_graph_node_serializes_type_key() {
        let node = GraphNode {
            id: Uuid::nil(),
            name: "X".into(),
            entity_type: "concept".into(),
            description: None,
            color: "#FF70A6".into(),
            timestamp: Some(30),
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "concept");
        assert_eq!(json["timestamp"], 30);
    }

    #[test]
    fn test_job_type_round_trip_strings() {
        for jt in [JobType::ProcessNote, JobType::YoutubeIngest] {
            assert_eq!(JobType::parse(jt.as_str()), Some(jt));
        }
        assert_eq!(JobType::parse("unknown"), None);
        assert_eq!(JobStatus::parse("running"), Some(JobStatus::Running));
        assert_eq!(JobStatus::parse("cancelled"), None);
    }

    #[test]
    fn test_search_target_deserializes_lowercase() {
        let t: SearchTarget = serde_json::from_str("\"notes\"").unwrap();
        assert_eq!(t, SearchTarget::Notes);
    }
}
