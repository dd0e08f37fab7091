use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use meridian_core::error::AppError;
use meridian_core::job::{Job, JobStatus, TaskStatus};
use meridian_core::models::{ExtractionRecord, RecordOwner};
use meridian_core::traits::{RecordStore, UpsertOutcome};

/// PostgreSQL-backed [`RecordStore`].
///
/// Non-empty phone numbers are unique across all records; a second record
/// with a known phone is reported as [`UpsertOutcome::Duplicate`].
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool<Postgres>,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records written for a job so far.
    pub async fn count_records(&self, job_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM records WHERE job_id = $1"#)
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count)
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl RecordStore for PgRecordStore {
    async fn register_job(&self, job: &Job) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, profile_id, engine, status, created_at)
            VALUES ($1, $2, $3, 'pending', $4)
            "#,
        )
        .bind(job.id)
        .bind(job.profile_id)
        .bind(job.engine.as_str())
        .bind(job.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::ValidationError(format!("Job {} already exists", job.id))
            } else {
                db_err(e)
            }
        })?;

        for (position, task) in job.tasks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO tasks (id, job_id, position, search, status)
                VALUES ($1, $2, $3, $4, 'pending')
                "#,
            )
            .bind(task.id)
            .bind(job.id)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(serde_json::to_value(&task.search)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::ValidationError(format!("Task {} already exists", task.id))
                } else {
                    db_err(e)
                }
            })?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn upsert_record(
        &self,
        record: &ExtractionRecord,
        owner: &RecordOwner,
    ) -> Result<UpsertOutcome, AppError> {
        let outreach = serde_json::to_value(&record.outreach)?;
        let decision = record
            .decision
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let email_status = serde_json::to_value(record.email_status)?;

        let result = sqlx::query(
            r#"
            INSERT INTO records (
                profile_id, job_id, task_id, keyword, city, postcode, state, country,
                name, phone, address, website, rating, review_count, latitude, longitude,
                strategy, email_status, outreach, decision, scraped_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8,
                $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21
            )
            "#,
        )
        .bind(owner.profile_id)
        .bind(owner.job_id)
        .bind(owner.task_id)
        .bind(&owner.search.keyword)
        .bind(&owner.search.city)
        .bind(&owner.search.postcode)
        .bind(&owner.search.state)
        .bind(&owner.search.country)
        .bind(&record.name)
        .bind(record.phone_key())
        .bind(&record.address)
        .bind(&record.website)
        .bind(record.rating)
        .bind(clamp_i32(record.review_count))
        .bind(record.coordinates.map(|c| c.latitude))
        .bind(record.coordinates.map(|c| c.longitude))
        .bind(record.strategy.as_str())
        .bind(email_status.as_str().unwrap_or_default())
        .bind(outreach)
        .bind(decision)
        .bind(record.scraped_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(UpsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(name = %record.name, "Phone already stored");
                Ok(UpsertOutcome::Duplicate)
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn set_task_status(&self, task_id: Uuid, status: TaskStatus) -> Result<(), AppError> {
        let job_id: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE tasks SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING job_id
            "#,
        )
        .bind(task_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some((job_id,)) = job_id else {
            return Err(AppError::NotFound(format!("Task {task_id}")));
        };

        // First pickup of any task moves the job out of pending.
        if status != TaskStatus::Pending {
            sqlx::query(
                r#"
                UPDATE jobs SET status = 'ongoing', updated_at = NOW()
                WHERE id = $1 AND status = 'pending'
                "#,
            )
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    async fn get_task_statuses(&self, job_id: Uuid) -> Result<Vec<TaskStatus>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT status FROM tasks WHERE job_id = $1 ORDER BY position"#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|(raw,)| raw.parse().map_err(AppError::DatabaseError))
            .collect()
    }

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), AppError> {
        let result = sqlx::query(r#"UPDATE jobs SET status = $2, updated_at = NOW() WHERE id = $1"#)
            .bind(job_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {job_id}")));
        }
        Ok(())
    }

    async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobStatus>, AppError> {
        let row: Option<(String,)> = sqlx::query_as(r#"SELECT status FROM jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|(raw,)| raw.parse().map_err(AppError::DatabaseError))
            .transpose()
    }
}
