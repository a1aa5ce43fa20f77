//! The note-processing state machine.
//!
//! ```text
//! START → EXTRACTING → EMBEDDING → [TIMESTAMPS] → SAVING entities
//!       → RELATIONSHIPS → SAVING relationships → COMPLETE
//! any stage --failure--> ERROR
//! ```
//!
//! Every graph write of a run goes through one [`GraphTransaction`]. A run
//! either commits all of its entities and resolvable relationships or leaves
//! the note's previous graph untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use atomic_core::{
    clamp_strength, defaults, prefix_chars, EmbeddingBackend, Error, ExtractedEntity,
    ExtractionOracle, GraphRepository, GraphTransaction, NewEntity, NewRelationship, Note,
    NoteRepository, PipelineStage, ProgressEvent, ProgressSink, Result, TimestampMap,
    TimestampMapper, Vector,
};

use crate::guard::RunRegistry;

/// Counts reported by a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub note_id: Uuid,
    pub entities: usize,
    pub relationships: usize,
    /// Detected relationships dropped because an endpoint name did not resolve.
    pub skipped_relationships: usize,
    /// Extracted entities dropped as same-name duplicates.
    pub duplicate_entities: usize,
    pub timestamps_mapped: usize,
}

/// Entities of a run after name normalization and de-duplication.
struct ExtractedSet {
    entities: Vec<ExtractedEntity>,
    duplicates: usize,
}

impl ExtractedSet {
    fn names(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.name.clone()).collect()
    }
}

/// Give blank names the placeholder name and keep only the first entity of
/// each exact name.
fn normalize_entities(raw: Vec<ExtractedEntity>, note_id: Uuid) -> ExtractedSet {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut entities = Vec::with_capacity(raw.len());
    let mut duplicates = 0;
    for mut entity in raw {
        let trimmed = entity.name.trim();
        entity.name = if trimmed.is_empty() {
            defaults::UNKNOWN_ENTITY_NAME.to_string()
        } else {
            trimmed.to_string()
        };
        if seen.insert(entity.name.clone()) {
            entities.push(entity);
        } else {
            duplicates += 1;
            warn!(
                subsystem = "pipeline",
                component = "orchestrator",
                note_id = %note_id,
                entity = %entity.name,
                partial_data = true,
                "Dropping duplicate entity name, keeping first occurrence"
            );
        }
    }
    ExtractedSet {
        entities,
        duplicates,
    }
}

/// Counts produced inside the graph transaction.
struct GraphWrite {
    entities: usize,
    relationships: usize,
    skipped: usize,
}

/// Runs extract → embed → timestamp → persist → relate → persist for one
/// note. Clones share collaborators and the run registry.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    notes: Arc<dyn NoteRepository>,
    graph: Arc<dyn GraphRepository>,
    oracle: Arc<dyn ExtractionOracle>,
    embedder: Arc<dyn EmbeddingBackend>,
    timestamps: Option<Arc<dyn TimestampMapper>>,
    runs: RunRegistry,
}

impl PipelineOrchestrator {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        graph: Arc<dyn GraphRepository>,
        oracle: Arc<dyn ExtractionOracle>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            notes,
            graph,
            oracle,
            embedder,
            timestamps: None,
            runs: RunRegistry::new(),
        }
    }

    /// Enable timestamp mapping for transcript-derived notes.
    pub fn with_timestamp_mapper(mut self, mapper: Arc<dyn TimestampMapper>) -> Self {
        self.timestamps = Some(mapper);
        self
    }

    pub fn runs(&self) -> &RunRegistry {
        &self.runs
    }

    /// Process one note, reporting every transition to `progress`.
    ///
    /// The event sequence always ends with `complete` (100) or `error` (0).
    /// Fails with `InvalidInput` when the note already has an active run and
    /// with `NoteNotFound` when it does not exist.
    #[instrument(
        skip(self, progress),
        fields(subsystem = "pipeline", component = "orchestrator", op = "run", note_id = %note_id)
    )]
    pub async fn run(&self, note_id: Uuid, progress: &dyn ProgressSink) -> Result<PipelineOutcome> {
        let Some(_lease) = self.runs.try_acquire(note_id) else {
            let message = format!("Note {} is already being processed", note_id);
            warn!("{}", message);
            progress.emit(ProgressEvent::error(message.clone()));
            return Err(Error::InvalidInput(message));
        };

        let note = match self.notes.fetch(note_id).await {
            Ok(Some(note)) => note,
            Ok(None) => {
                progress.emit(ProgressEvent::error(format!("Note {} not found", note_id)));
                return Err(Error::NoteNotFound(note_id));
            }
            Err(e) => {
                error!(error = %e, "Failed to load note");
                progress.emit(ProgressEvent::error(format!("Processing failed: {}", e)));
                return Err(e);
            }
        };

        let start = Instant::now();
        info!(title = %note.title, "Processing note");
        progress.emit(ProgressEvent::new(
            PipelineStage::Start,
            format!("Processing: {}", note.title),
            0,
        ));

        match self.execute(&note, progress).await {
            Ok(outcome) => {
                info!(
                    entity_count = outcome.entities,
                    relationship_count = outcome.relationships,
                    skipped_relationships = outcome.skipped_relationships,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Processing complete"
                );
                progress.emit(ProgressEvent::new(
                    PipelineStage::Complete,
                    format!(
                        "Processing complete! {} entities, {} relationships",
                        outcome.entities, outcome.relationships
                    ),
                    100,
                ));
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Processing failed"
                );
                progress.emit(ProgressEvent::error(format!("Processing failed: {}", e)));
                Err(e)
            }
        }
    }

    async fn execute(&self, note: &Note, progress: &dyn ProgressSink) -> Result<PipelineOutcome> {
        // EXTRACTING
        progress.emit(ProgressEvent::new(
            PipelineStage::ExtractingEntities,
            "Analyzing text and extracting entities...",
            20,
        ));
        let raw = self.oracle.extract_entities(&note.content).await?;
        let extracted = normalize_entities(raw, note.id);
        progress.emit(ProgressEvent::new(
            PipelineStage::ExtractingEntities,
            format!("Found {} entities", extracted.entities.len()),
            35,
        ));

        // EMBEDDING
        progress.emit(ProgressEvent::new(
            PipelineStage::Embedding,
            "Generating embeddings for all entities...",
            40,
        ));
        let (note_embedding, entity_embeddings) = self.embed(note, &extracted).await?;
        progress.emit(ProgressEvent::new(
            PipelineStage::Embedding,
            format!("Generated {} embeddings", entity_embeddings.len() + 1),
            55,
        ));

        // TIMESTAMPS
        let timestamps = self.map_timestamps(note, &extracted, progress).await;

        // SAVING + RELATIONSHIPS, inside one transaction
        let mut tx = self.graph.begin().await?;
        let written = match self
            .write_graph(
                &mut *tx,
                note,
                &extracted,
                note_embedding,
                entity_embeddings,
                &timestamps,
                progress,
            )
            .await
        {
            Ok(written) => written,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        Ok(PipelineOutcome {
            note_id: note.id,
            entities: written.entities,
            relationships: written.relationships,
            skipped_relationships: written.skipped,
            duplicate_entities: extracted.duplicates,
            timestamps_mapped: timestamps.len(),
        })
    }

    /// One batch: note content first, then each entity in extraction order.
    async fn embed(&self, note: &Note, extracted: &ExtractedSet) -> Result<(Vector, Vec<Vector>)> {
        let mut texts = Vec::with_capacity(extracted.entities.len() + 1);
        texts.push(note.content.clone());
        texts.extend(extracted.entities.iter().map(ExtractedEntity::embedding_text));

        let start = Instant::now();
        let mut vectors = self.embedder.embed_texts(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Embedding provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        debug!(
            input_count = texts.len(),
            model = self.embedder.model_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch embedded"
        );

        let entity_vectors = vectors.split_off(1);
        let note_vector = vectors
            .pop()
            .ok_or_else(|| Error::Embedding("Embedding provider returned no vectors".to_string()))?;
        Ok((note_vector, entity_vectors))
    }

    /// Timestamps for transcript-derived notes. Mapper failures degrade to an
    /// empty map.
    async fn map_timestamps(
        &self,
        note: &Note,
        extracted: &ExtractedSet,
        progress: &dyn ProgressSink,
    ) -> TimestampMap {
        let segments = note.transcript_segments();
        if segments.is_empty() {
            return TimestampMap::new();
        }
        let Some(mapper) = self.timestamps.as_ref() else {
            debug!("Transcript segments present but no timestamp mapper configured");
            return TimestampMap::new();
        };

        progress.emit(ProgressEvent::new(
            PipelineStage::MappingTimestamps,
            "Mapping entities to transcript timestamps...",
            58,
        ));
        let mapped = match mapper.map_timestamps(&extracted.names(), &segments).await {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    error = %e,
                    segment_count = segments.len(),
                    "Timestamp mapping failed, continuing without timestamps"
                );
                TimestampMap::new()
            }
        };
        progress.emit(ProgressEvent::new(
            PipelineStage::MappingTimestamps,
            format!("Mapped {} entities to timestamps", mapped.len()),
            60,
        ));
        mapped
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_graph(
        &self,
        tx: &mut dyn GraphTransaction,
        note: &Note,
        extracted: &ExtractedSet,
        note_embedding: Vector,
        entity_embeddings: Vec<Vector>,
        timestamps: &TimestampMap,
        progress: &dyn ProgressSink,
    ) -> Result<GraphWrite> {
        progress.emit(ProgressEvent::new(
            PipelineStage::SavingEntities,
            "Saving entities to database...",
            62,
        ));
        tx.clear_note_graph(note.id).await?;
        tx.set_note_embedding(note.id, &note_embedding).await?;

        let rows: Vec<NewEntity> = extracted
            .entities
            .iter()
            .zip(entity_embeddings)
            .map(|(entity, embedding)| NewEntity {
                name: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
                description: entity.description.clone(),
                color: entity.color.clone(),
                embedding: Some(embedding),
                timestamp: timestamps.get(&entity.name).copied(),
            })
            .collect();
        let ids = tx.save_entities(note.id, &rows).await?;
        if ids.len() != rows.len() {
            return Err(Error::Internal(format!(
                "Entity save returned {} ids for {} entities",
                ids.len(),
                rows.len()
            )));
        }
        let name_to_id: HashMap<&str, Uuid> = rows
            .iter()
            .map(|r| r.name.as_str())
            .zip(ids.iter().copied())
            .collect();
        progress.emit(ProgressEvent::new(
            PipelineStage::SavingEntities,
            format!("Saved {} entities", ids.len()),
            70,
        ));

        progress.emit(ProgressEvent::new(
            PipelineStage::DetectingRelationships,
            "Analyzing relationships between entities...",
            75,
        ));
        // This model call runs inside the open graph transaction and holds its
        // pooled connection until commit; `DB_MAX_CONNECTIONS` has to cover
        // concurrent runs.
        let detected = self
            .oracle
            .detect_relationships(
                &extracted.names(),
                prefix_chars(&note.content, defaults::RELATIONSHIP_CONTEXT_CHARS),
            )
            .await?;
        progress.emit(ProgressEvent::new(
            PipelineStage::DetectingRelationships,
            format!("Found {} relationships", detected.len()),
            85,
        ));

        progress.emit(ProgressEvent::new(
            PipelineStage::SavingRelationships,
            "Saving relationships to database...",
            90,
        ));
        let mut resolved = Vec::with_capacity(detected.len());
        let mut skipped = 0;
        for rel in detected {
            let source = name_to_id.get(rel.source.trim());
            let target = name_to_id.get(rel.target.trim());
            match (source, target) {
                (Some(&source_entity_id), Some(&target_entity_id)) => {
                    resolved.push(NewRelationship {
                        source_entity_id,
                        target_entity_id,
                        relationship_type: rel.relationship_type,
                        strength: clamp_strength(rel.strength),
                        explanation: rel.explanation,
                    });
                }
                _ => {
                    skipped += 1;
                    warn!(
                        source = %rel.source,
                        target = %rel.target,
                        partial_data = true,
                        "Skipping relationship: entities not found"
                    );
                }
            }
        }
        let saved = tx.save_relationships(&resolved).await?;

        Ok(GraphWrite {
            entities: ids.len(),
            relationships: saved.len(),
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> ExtractedEntity {
        ExtractedEntity::new(name, "concept", format!("{name} description"))
    }

    #[test]
    fn test_normalize_keeps_first_duplicate() {
        let mut second = entity("Rust");
        second.description = "second".to_string();
        let set = normalize_entities(vec![entity("Rust"), entity("Tokio"), second], Uuid::nil());
        assert_eq!(set.duplicates, 1);
        assert_eq!(set.names(), vec!["Rust", "Tokio"]);
        assert_eq!(set.entities[0].description, "Rust description");
    }

    #[test]
    fn test_normalize_blank_names_become_unknown() {
        let set = normalize_entities(vec![entity("  "), entity(""), entity(" Axum ")], Uuid::nil());
        assert_eq!(set.names(), vec!["Unknown", "Axum"]);
        assert_eq!(set.duplicates, 1);
    }

    #[test]
    fn test_normalize_is_case_sensitive() {
        let set = normalize_entities(vec![entity("rust"), entity("Rust")], Uuid::nil());
        assert_eq!(set.entities.len(), 2);
        assert_eq!(set.duplicates, 0);
    }
}
