//! Note repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use atomic_core::{
    new_v7, CreateNoteRequest, Error, Note, NoteRepository, NoteSummary, Result, Vector,
};

pub(crate) const NOTE_COLUMNS: &str = "id, title, content, source_file, note_metadata, topic_id, \
                            created_at, updated_at, embedding";

/// PostgreSQL implementation of NoteRepository.
#[derive(Clone)]
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub(crate) fn parse_note_row(row: &PgRow) -> Note {
        Note {
            id: row.get("id"),
            title: row.get("title"),
            content: row.get("content"),
            source_file: row.get("source_file"),
            note_metadata: row
                .get::<Option<JsonValue>, _>("note_metadata")
                .unwrap_or_else(|| JsonValue::Object(Default::default())),
            topic_id: row.get("topic_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            embedding: row.get::<Option<Vector>, _>("embedding"),
        }
    }

    /// Execute a single-row update, mapping zero affected rows to `NoteNotFound`.
    async fn touch(&self, id: Uuid, query: Query<'_, Postgres, PgArguments>) -> Result<()> {
        let result = query.execute(&self.pool).await.map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn insert(&self, req: CreateNoteRequest) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        let metadata = req
            .metadata
            .unwrap_or_else(|| JsonValue::Object(Default::default()));

        sqlx::query(
            "INSERT INTO note (id, title, content, source_file, note_metadata, topic_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
        )
        .bind(id)
        .bind(&req.title)
        .bind(&req.content)
        .bind(&req.source_file)
        .bind(&metadata)
        .bind(req.topic_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query(&format!("SELECT {NOTE_COLUMNS} FROM note WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_note_row))
    }

    async fn list(&self) -> Result<Vec<NoteSummary>> {
        let rows = sqlx::query(
            "SELECT n.id, n.title, n.created_at, n.note_metadata, n.topic_id,
                    COALESCE(ec.cnt, 0) AS entity_count
             FROM note n
             LEFT JOIN (
                 SELECT note_id, COUNT(*) AS cnt FROM entity GROUP BY note_id
             ) ec ON ec.note_id = n.id
             ORDER BY n.created_at DESC, n.id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| NoteSummary {
                id: row.get("id"),
                title: row.get("title"),
                created_at: row.get("created_at"),
                entity_count: row.get("entity_count"),
                note_metadata: row
                    .get::<Option<JsonValue>, _>("note_metadata")
                    .unwrap_or_else(|| JsonValue::Object(Default::default())),
                topic_id: row.get("topic_id"),
            })
            .collect())
    }

    async fn update_content(&self, id: Uuid, content: &str) -> Result<()> {
        self.touch(
            id,
            sqlx::query("UPDATE note SET content = $1, updated_at = $2 WHERE id = $3")
                .bind(content)
                .bind(Utc::now())
                .bind(id),
        )
        .await
    }

    async fn update_title(&self, id: Uuid, title: &str) -> Result<()> {
        self.touch(
            id,
            sqlx::query("UPDATE note SET title = $1, updated_at = $2 WHERE id = $3")
                .bind(title)
                .bind(Utc::now())
                .bind(id),
        )
        .await
    }

    async fn merge_metadata(&self, id: Uuid, patch: JsonValue) -> Result<()> {
        if !patch.is_object() {
            return Err(Error::InvalidInput(
                "metadata patch must be a JSON object".to_string(),
            ));
        }
        self.touch(
            id,
            sqlx::query(
                "UPDATE note
                 SET note_metadata = COALESCE(note_metadata, '{}'::jsonb) || $1::jsonb,
                     updated_at = $2
                 WHERE id = $3",
            )
            .bind(patch)
            .bind(Utc::now())
            .bind(id),
        )
        .await
    }
}
