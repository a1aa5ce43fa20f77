//! Graph persistence: transactional entity/relationship writes and the
//! read-only graph projections served to clients.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use atomic_core::{
    new_v7, CascadeDeleteSummary, Entity, Error, Graph, GraphRepository, GraphTransaction,
    NewEntity, NewRelationship, Relationship, Result, Vector,
};

pub(crate) const ENTITY_COLUMNS: &str =
    "id, note_id, name, entity_type, description, color, timestamp_secs, embedding";

pub(crate) fn parse_entity_row(row: &PgRow) -> Entity {
    Entity {
        id: row.get("id"),
        note_id: row.get("note_id"),
        name: row.get("name"),
        entity_type: row.get("entity_type"),
        description: row.get("description"),
        color: row.get("color"),
        timestamp: row.get("timestamp_secs"),
        embedding: row.get::<Option<Vector>, _>("embedding"),
    }
}

fn parse_relationship_row(row: &PgRow) -> Relationship {
    Relationship {
        id: row.get("id"),
        source_entity_id: row.get("source_entity_id"),
        target_entity_id: row.get("target_entity_id"),
        relationship_type: row.get("relationship_type"),
        strength: row.get("strength"),
        ai_explanation: row.get("ai_explanation"),
    }
}

/// Entity set a graph projection covers.
#[derive(Debug, Clone, Copy)]
enum GraphScope {
    Note(Uuid),
    Topic(Uuid),
}

impl GraphScope {
    fn id(&self) -> Uuid {
        match self {
            GraphScope::Note(id) | GraphScope::Topic(id) => *id,
        }
    }

    /// SQL predicate on the entity table aliased as `alias`, bound to `$1`.
    fn predicate(&self, alias: &str) -> String {
        match self {
            GraphScope::Note(_) => format!("{alias}.note_id = $1"),
            GraphScope::Topic(_) => {
                format!("{alias}.note_id IN (SELECT id FROM note WHERE topic_id = $1)")
            }
        }
    }
}

/// PostgreSQL implementation of GraphRepository.
#[derive(Clone)]
pub struct PgGraphRepository {
    pool: Pool<Postgres>,
}

impl PgGraphRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn exists(&self, sql: &str, id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    /// Load the entities in `scope` plus relationships whose both endpoints
    /// are in it.
    async fn load_graph(&self, scope: GraphScope) -> Result<Graph> {
        let id = scope.id();
        let entity_rows = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entity e WHERE {} ORDER BY e.id",
            scope.predicate("e")
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let source_filter = scope.predicate("s");
        let target_filter = scope.predicate("t");
        let rel_rows = sqlx::query(&format!(
            "SELECT r.id, r.source_entity_id, r.target_entity_id, r.relationship_type,
                    r.strength, r.ai_explanation
             FROM relationship r
             JOIN entity s ON s.id = r.source_entity_id
             JOIN entity t ON t.id = r.target_entity_id
             WHERE {source_filter} AND {target_filter}
             ORDER BY r.id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Graph {
            entities: entity_rows
                .iter()
                .map(|r| parse_entity_row(r).into())
                .collect(),
            relationships: rel_rows
                .iter()
                .map(|r| parse_relationship_row(r).into())
                .collect(),
        })
    }
}

#[async_trait]
impl GraphRepository for PgGraphRepository {
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PgGraphTransaction { tx }))
    }

    async fn note_graph(&self, note_id: Uuid) -> Result<Graph> {
        if !self
            .exists("SELECT EXISTS(SELECT 1 FROM note WHERE id = $1)", note_id)
            .await?
        {
            return Err(Error::NoteNotFound(note_id));
        }
        self.load_graph(GraphScope::Note(note_id)).await
    }

    async fn topic_graph(&self, topic_id: Uuid) -> Result<Graph> {
        if !self
            .exists("SELECT EXISTS(SELECT 1 FROM topic WHERE id = $1)", topic_id)
            .await?
        {
            return Err(Error::TopicNotFound(topic_id));
        }
        self.load_graph(GraphScope::Topic(topic_id)).await
    }

    async fn delete_note_cascade(&self, note_id: Uuid) -> Result<CascadeDeleteSummary> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let title: Option<String> =
            sqlx::query_scalar("SELECT title FROM note WHERE id = $1 FOR UPDATE")
                .bind(note_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
        let Some(title) = title else {
            return Err(Error::NoteNotFound(note_id));
        };

        sqlx::query(
            "DELETE FROM annotation WHERE entity_id IN (SELECT id FROM entity WHERE note_id = $1)",
        )
        .bind(note_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let relationships_deleted = sqlx::query(
            "DELETE FROM relationship
             WHERE source_entity_id IN (SELECT id FROM entity WHERE note_id = $1)
                OR target_entity_id IN (SELECT id FROM entity WHERE note_id = $1)",
        )
        .bind(note_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        let entities_deleted = sqlx::query("DELETE FROM entity WHERE note_id = $1")
            .bind(note_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        sqlx::query("DELETE FROM note WHERE id = $1")
            .bind(note_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "graph",
            op = "delete_note_cascade",
            note_id = %note_id,
            entity_count = entities_deleted,
            relationship_count = relationships_deleted,
            "Note deleted with its graph"
        );

        Ok(CascadeDeleteSummary {
            note_id,
            title,
            entities_deleted,
            relationships_deleted,
        })
    }

    async fn fetch_entity(&self, entity_id: Uuid) -> Result<Option<Entity>> {
        let row = sqlx::query(&format!("SELECT {ENTITY_COLUMNS} FROM entity WHERE id = $1"))
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.as_ref().map(parse_entity_row))
    }
}

/// One pipeline run's writes, held in an open PostgreSQL transaction.
///
/// Dropping without `commit` rolls back.
pub struct PgGraphTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl GraphTransaction for PgGraphTransaction {
    async fn clear_note_graph(&mut self, note_id: Uuid) -> Result<()> {
        sqlx::query(
            "DELETE FROM annotation WHERE entity_id IN (SELECT id FROM entity WHERE note_id = $1)",
        )
        .bind(note_id)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "DELETE FROM relationship
             WHERE source_entity_id IN (SELECT id FROM entity WHERE note_id = $1)
                OR target_entity_id IN (SELECT id FROM entity WHERE note_id = $1)",
        )
        .bind(note_id)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("DELETE FROM entity WHERE note_id = $1")
            .bind(note_id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn set_note_embedding(&mut self, note_id: Uuid, embedding: &Vector) -> Result<()> {
        let result = sqlx::query("UPDATE note SET embedding = $1, updated_at = $2 WHERE id = $3")
            .bind(embedding)
            .bind(Utc::now())
            .bind(note_id)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(note_id));
        }
        Ok(())
    }

    async fn save_entities(&mut self, note_id: Uuid, entities: &[NewEntity]) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = new_v7();
            sqlx::query(
                "INSERT INTO entity (id, note_id, name, entity_type, description, color,
                                     embedding, timestamp_secs, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(id)
            .bind(note_id)
            .bind(&entity.name)
            .bind(&entity.entity_type)
            .bind(&entity.description)
            .bind(&entity.color)
            .bind(entity.embedding.as_ref())
            .bind(entity.timestamp)
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn save_relationships(
        &mut self,
        relationships: &[NewRelationship],
    ) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let mut ids = Vec::with_capacity(relationships.len());
        for rel in relationships {
            let id = new_v7();
            sqlx::query(
                "INSERT INTO relationship (id, source_entity_id, target_entity_id,
                                           relationship_type, strength, ai_explanation, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(id)
            .bind(rel.source_entity_id)
            .bind(rel.target_entity_id)
            .bind(&rel.relationship_type)
            .bind(rel.strength)
            .bind(&rel.explanation)
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(Error::Database)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(Error::Database)
    }
}
