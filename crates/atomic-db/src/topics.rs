//! Topic repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use atomic_core::{
    defaults, new_v7, CreateTopicRequest, Error, Result, Topic, TopicRepository,
};

/// PostgreSQL implementation of TopicRepository.
#[derive(Clone)]
pub struct PgTopicRepository {
    pool: Pool<Postgres>,
}

impl PgTopicRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_topic_row(row: &PgRow) -> Topic {
        Topic {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            emoji: row.get("emoji"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl TopicRepository for PgTopicRepository {
    async fn create(&self, req: CreateTopicRequest) -> Result<Topic> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("topic name must not be empty".to_string()));
        }
        let emoji = req
            .emoji
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| defaults::TOPIC_EMOJI.to_string());

        let row = sqlx::query(
            "INSERT INTO topic (id, name, description, emoji, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING id, name, description, emoji, created_at, updated_at",
        )
        .bind(new_v7())
        .bind(name)
        .bind(&req.description)
        .bind(&emoji)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_topic_row(&row))
    }

    async fn list(&self) -> Result<Vec<Topic>> {
        let rows = sqlx::query(
            "SELECT id, name, description, emoji, created_at, updated_at
             FROM topic ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(Self::parse_topic_row).collect())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Topic>> {
        let row = sqlx::query(
            "SELECT id, name, description, emoji, created_at, updated_at FROM topic WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::parse_topic_row))
    }
}
