//! pgvector similarity search and the substring fallback.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use atomic_core::{
    EmbeddingBackfillRepository, Entity, EntityMatch, Error, Note, NoteMatch, Result, Vector,
    VectorSearchRepository,
};

use crate::escape_like;
use crate::graph::{parse_entity_row, ENTITY_COLUMNS};
use crate::notes::{PgNoteRepository, NOTE_COLUMNS};

/// PostgreSQL + pgvector implementation of VectorSearchRepository.
///
/// Similarity is `1 - cosine_distance` (`<=>`); rows without an embedding
/// never match a vector query.
#[derive(Clone)]
pub struct PgVectorSearch {
    pool: Pool<Postgres>,
}

impl PgVectorSearch {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn entity_match(row: &PgRow, with_similarity: bool) -> EntityMatch {
        EntityMatch {
            entity: parse_entity_row(row),
            similarity: with_similarity.then(|| row.get::<f64, _>("similarity")),
        }
    }

    fn note_match(row: &PgRow, with_similarity: bool) -> NoteMatch {
        NoteMatch {
            id: row.get("id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
            topic_id: row.get("topic_id"),
            similarity: with_similarity.then(|| row.get::<f64, _>("similarity")),
        }
    }
}

#[async_trait]
impl VectorSearchRepository for PgVectorSearch {
    async fn search_entities(
        &self,
        query: &Vector,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<EntityMatch>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS}, 1 - (embedding <=> $1) AS similarity
             FROM entity
             WHERE embedding IS NOT NULL AND 1 - (embedding <=> $1) >= $2
             ORDER BY embedding <=> $1
             LIMIT $3"
        ))
        .bind(query)
        .bind(min_similarity)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "search",
            component = "vector",
            op = "search_entities",
            result_count = rows.len(),
            "Entity vector search complete"
        );
        Ok(rows.iter().map(|r| Self::entity_match(r, true)).collect())
    }

    async fn search_notes(
        &self,
        query: &Vector,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<NoteMatch>> {
        let rows = sqlx::query(
            "SELECT id, title, created_at, topic_id, 1 - (embedding <=> $1) AS similarity
             FROM note
             WHERE embedding IS NOT NULL AND 1 - (embedding <=> $1) >= $2
             ORDER BY embedding <=> $1
             LIMIT $3",
        )
        .bind(query)
        .bind(min_similarity)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|r| Self::note_match(r, true)).collect())
    }

    async fn related_entities(
        &self,
        entity_id: Uuid,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<EntityMatch>> {
        let columns = ENTITY_COLUMNS
            .split(", ")
            .map(|c| format!("e.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = sqlx::query(&format!(
            "WITH src AS (
                 SELECT embedding FROM entity WHERE id = $1 AND embedding IS NOT NULL
             )
             SELECT {columns}, 1 - (e.embedding <=> src.embedding) AS similarity
             FROM entity e, src
             WHERE e.id <> $1
               AND e.embedding IS NOT NULL
               AND 1 - (e.embedding <=> src.embedding) >= $2
             ORDER BY e.embedding <=> src.embedding
             LIMIT $3"
        ))
        .bind(entity_id)
        .bind(min_similarity)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|r| Self::entity_match(r, true)).collect())
    }

    async fn text_search_entities(&self, query: &str, limit: i64) -> Result<Vec<EntityMatch>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entity
             WHERE name ILIKE $1 OR description ILIKE $1
             ORDER BY name
             LIMIT $2"
        ))
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|r| Self::entity_match(r, false)).collect())
    }

    async fn text_search_notes(&self, query: &str, limit: i64) -> Result<Vec<NoteMatch>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(
            "SELECT id, title, created_at, topic_id FROM note
             WHERE title ILIKE $1 OR content ILIKE $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|r| Self::note_match(r, false)).collect())
    }
}

#[async_trait]
impl EmbeddingBackfillRepository for PgVectorSearch {
    async fn entities_missing_embedding(&self, limit: i64) -> Result<Vec<Entity>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entity
             WHERE embedding IS NULL
             ORDER BY created_at, id
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(parse_entity_row).collect())
    }

    async fn notes_missing_embedding(&self, limit: i64) -> Result<Vec<Note>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM note
             WHERE embedding IS NULL
             ORDER BY created_at, id
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(PgNoteRepository::parse_note_row).collect())
    }

    async fn set_entity_embedding(&self, entity_id: Uuid, embedding: &Vector) -> Result<()> {
        let result = sqlx::query("UPDATE entity SET embedding = $1 WHERE id = $2")
            .bind(embedding)
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::EntityNotFound(entity_id));
        }
        Ok(())
    }

    async fn set_note_embedding(&self, note_id: Uuid, embedding: &Vector) -> Result<()> {
        let result = sqlx::query("UPDATE note SET embedding = $1, updated_at = $2 WHERE id = $3")
            .bind(embedding)
            .bind(Utc::now())
            .bind(note_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(note_id));
        }
        Ok(())
    }
}
