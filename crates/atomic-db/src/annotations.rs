//! Annotation repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use atomic_core::{new_v7, Annotation, AnnotationRepository, Error, Result};

const ANNOTATION_COLUMNS: &str = "id, entity_id, user_note, created_at";

/// PostgreSQL implementation of AnnotationRepository.
#[derive(Clone)]
pub struct PgAnnotationRepository {
    pool: Pool<Postgres>,
}

impl PgAnnotationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_annotation_row(row: &PgRow) -> Annotation {
        Annotation {
            id: row.get("id"),
            entity_id: row.get("entity_id"),
            user_note: row.get("user_note"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl AnnotationRepository for PgAnnotationRepository {
    async fn create(&self, entity_id: Uuid, user_note: &str) -> Result<Annotation> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM entity WHERE id = $1)")
            .bind(entity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        if !exists {
            return Err(Error::EntityNotFound(entity_id));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO annotation (id, entity_id, user_note, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {ANNOTATION_COLUMNS}"
        ))
        .bind(new_v7())
        .bind(entity_id)
        .bind(user_note)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_annotation_row(&row))
    }

    async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<Annotation>> {
        let rows = sqlx::query(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotation
             WHERE entity_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(Self::parse_annotation_row).collect())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Annotation>> {
        let row = sqlx::query(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotation WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::parse_annotation_row))
    }

    async fn update(&self, id: Uuid, user_note: &str) -> Result<Option<Annotation>> {
        let row = sqlx::query(&format!(
            "UPDATE annotation SET user_note = $1 WHERE id = $2 RETURNING {ANNOTATION_COLUMNS}"
        ))
        .bind(user_note)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::parse_annotation_row))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM annotation WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
