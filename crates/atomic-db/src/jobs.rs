//! Job repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::warn;
use uuid::Uuid;

use atomic_core::{new_v7, Error, Job, JobRepository, JobStatus, JobType, Result};

const JOB_COLUMNS: &str = "id, note_id, job_type::text, status::text, priority, payload, result, \
                           error_message, progress_percent, progress_stage, progress_message, \
                           retry_count, max_retries, created_at, started_at, completed_at";

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    max_retries: i32,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            max_retries: atomic_core::defaults::JOB_MAX_RETRIES,
        }
    }

    /// Override the retry budget given to newly queued jobs.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn parse_job_row(row: PgRow) -> Result<Job> {
        let job_type: String = row.get("job_type");
        let status: String = row.get("status");
        Ok(Job {
            id: row.get("id"),
            note_id: row.get("note_id"),
            job_type: JobType::parse(&job_type)
                .ok_or_else(|| Error::Job(format!("unknown job type '{job_type}'")))?,
            status: JobStatus::parse(&status)
                .ok_or_else(|| Error::Job(format!("unknown job status '{status}'")))?,
            priority: row.get("priority"),
            payload: row.get("payload"),
            result: row.get("result"),
            error_message: row.get("error_message"),
            progress_percent: row.get("progress_percent"),
            progress_stage: row.get("progress_stage"),
            progress_message: row.get("progress_message"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        note_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job_id = new_v7();

        sqlx::query(
            "INSERT INTO job_queue (id, note_id, job_type, status, priority, payload, max_retries, created_at)
             VALUES ($1, $2, $3::job_type, 'pending'::job_status, $4, $5, $6, $7)",
        )
        .bind(job_id)
        .bind(note_id)
        .bind(job_type.as_str())
        .bind(priority)
        .bind(&payload)
        .bind(self.max_retries)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(job_id)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let type_strings: Vec<String> = job_types.iter().map(|jt| jt.as_str().to_string()).collect();

        // Empty array = claim any type.
        let row = sqlx::query(&format!(
            "UPDATE job_queue
             SET status = 'running'::job_status, started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'::job_status
                   AND (cardinality($2::text[]) = 0 OR job_type::text = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(&type_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        percent: i32,
        stage: Option<&str>,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET progress_percent = $1, progress_stage = $2, progress_message = $3
             WHERE id = $4",
        )
        .bind(percent.clamp(0, 100))
        .bind(stage)
        .bind(message)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'completed'::job_status, completed_at = $1, result = $2,
                 progress_percent = 100
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) = sqlx::query_as(
            "SELECT retry_count, max_retries FROM job_queue WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if retry_count < max_retries {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending'::job_status, retry_count = $1, error_message = $2,
                     started_at = NULL, progress_percent = 0, progress_stage = NULL,
                     progress_message = NULL
                 WHERE id = $3",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            warn!(
                subsystem = "jobs",
                component = "queue",
                job_id = %job_id,
                retry_count = retry_count + 1,
                max_retries,
                error = error,
                "Job failed, re-queued for retry"
            );
        } else {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed'::job_status, completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(Utc::now())
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(Self::parse_job_row).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'::job_status")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
