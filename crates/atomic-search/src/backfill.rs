//! Fill in embeddings for entities and notes stored without one.
//!
//! Rows written while the embedding provider was unconfigured, or imported
//! from elsewhere, never show up in vector search. The backfill embeds the
//! same text the pipeline would have: `"{name} - {description}"` for
//! entities and the full content for notes.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use atomic_core::{EmbeddingBackend, EmbeddingBackfillRepository, Entity, Error, Result, Vector};

/// Rows fetched and embedded per round trip.
pub const DEFAULT_BACKFILL_BATCH: i64 = 100;

/// Which tables to backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackfillScope {
    Entities,
    Notes,
    #[default]
    All,
}

impl BackfillScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entities" | "entity" => Some(Self::Entities),
            "notes" | "note" => Some(Self::Notes),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn entities(self) -> bool {
        matches!(self, Self::Entities | Self::All)
    }

    fn notes(self) -> bool {
        matches!(self, Self::Notes | Self::All)
    }
}

/// Counts from one backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub entities: usize,
    pub notes: usize,
    /// Rows deleted between listing and writing.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct EmbeddingBackfill {
    store: Arc<dyn EmbeddingBackfillRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    batch_size: i64,
}

impl EmbeddingBackfill {
    pub fn new(
        store: Arc<dyn EmbeddingBackfillRepository>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size: DEFAULT_BACKFILL_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embed every row in `scope` that has no embedding, batch by batch,
    /// until none remain. Already-embedded rows are never touched.
    #[instrument(skip(self), fields(
        subsystem = "search",
        component = "backfill",
        op = "run",
        model = self.embedder.model_name(),
    ))]
    pub async fn run(&self, scope: BackfillScope) -> Result<BackfillReport> {
        let start = Instant::now();
        let mut report = BackfillReport::default();

        if scope.entities() {
            loop {
                let batch = self.store.entities_missing_embedding(self.batch_size).await?;
                if batch.is_empty() {
                    break;
                }
                let texts: Vec<String> = batch.iter().map(Entity::embedding_text).collect();
                let vectors = self.embed(&texts).await?;
                for (entity, vector) in batch.iter().zip(&vectors) {
                    let written = self.store.set_entity_embedding(entity.id, vector).await;
                    tally(written, entity.id, &mut report.entities, &mut report.skipped)?;
                }
                debug!(batch = batch.len(), total = report.entities, "Entity batch embedded");
            }
        }

        if scope.notes() {
            loop {
                let batch = self.store.notes_missing_embedding(self.batch_size).await?;
                if batch.is_empty() {
                    break;
                }
                let texts: Vec<String> = batch.iter().map(|n| n.content.clone()).collect();
                let vectors = self.embed(&texts).await?;
                for (note, vector) in batch.iter().zip(&vectors) {
                    let written = self.store.set_note_embedding(note.id, vector).await;
                    tally(written, note.id, &mut report.notes, &mut report.skipped)?;
                }
                debug!(batch = batch.len(), total = report.notes, "Note batch embedded");
            }
        }

        info!(
            entities = report.entities,
            notes = report.notes,
            skipped = report.skipped,
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding backfill complete"
        );
        Ok(report)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let vectors = self.embedder.embed_texts(texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Embedding provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

fn tally(written: Result<()>, id: Uuid, filled: &mut usize, skipped: &mut usize) -> Result<()> {
    match written {
        Ok(()) => *filled += 1,
        Err(e) if e.is_not_found() => {
            warn!(%id, "Row deleted before its embedding was written");
            *skipped += 1;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}
