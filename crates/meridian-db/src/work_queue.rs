use std::collections::BTreeMap;
use std::time::Duration;

use sqlx::{PgPool, Pool, Postgres};
use tokio::time::Instant;

use meridian_core::error::AppError;
use meridian_core::job::QueueItem;
use meridian_core::job_queue::{WorkQueue, with_engine_lanes};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Durable [`WorkQueue`] over the `queue_items` table.
///
/// Claiming deletes the row inside the `SELECT ... FOR UPDATE SKIP LOCKED`
/// statement, so concurrent workers never receive the same item. Rows whose
/// `available_at` lies in the future are invisible until their backoff ends.
#[derive(Clone)]
pub struct PgWorkQueue {
    pool: Pool<Postgres>,
    poll_interval: Duration,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How often an idle `dequeue` re-checks its lane.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn insert(&self, lane: &str, item: &QueueItem, delay: Duration) -> Result<(), AppError> {
        let payload = serde_json::to_value(item)?;
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO queue_items (lane, payload, available_at)
            VALUES ($1, $2, NOW() + ($3::bigint * INTERVAL '1 millisecond'))
            "#,
        )
        .bind(lane)
        .bind(payload)
        .bind(delay_ms)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(())
    }

    async fn try_claim(&self, lane: &str) -> Result<Option<QueueItem>, AppError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r#"
            DELETE FROM queue_items
            WHERE id = (
                SELECT id FROM queue_items
                WHERE lane = $1 AND available_at <= NOW()
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .bind(lane)
        .fetch_optional(&self.pool)
        .await
        .map_err(queue_err)?;

        let Some((payload,)) = row else {
            return Ok(None);
        };
        match serde_json::from_value(payload) {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                tracing::error!(%lane, error = %e, "Dropping malformed queue item");
                Err(AppError::QueueError(format!("Malformed item on {lane}: {e}")))
            }
        }
    }
}

fn queue_err(e: sqlx::Error) -> AppError {
    AppError::QueueError(e.to_string())
}

impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, lane: &str, item: &QueueItem) -> Result<(), AppError> {
        self.insert(lane, item, Duration::ZERO).await
    }

    async fn dequeue(&self, lane: &str, timeout: Duration) -> Result<Option<QueueItem>, AppError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_claim(lane).await? {
                return Ok(Some(item));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn requeue(&self, lane: &str, item: &QueueItem, delay: Duration) -> Result<(), AppError> {
        self.insert(lane, item, delay).await
    }

    async fn lane_lengths(&self) -> Result<BTreeMap<String, u64>, AppError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as(r#"SELECT lane, COUNT(*) FROM queue_items GROUP BY lane"#)
                .fetch_all(&self.pool)
                .await
                .map_err(queue_err)?;

        let lengths = rows
            .into_iter()
            .map(|(lane, count)| (lane, u64::try_from(count).unwrap_or(0)))
            .collect();
        Ok(with_engine_lanes(lengths))
    }

    async fn clear(&self, lane: &str) -> Result<u64, AppError> {
        let result = sqlx::query(r#"DELETE FROM queue_items WHERE lane = $1"#)
            .bind(lane)
            .execute(&self.pool)
            .await
            .map_err(queue_err)?;
        Ok(result.rows_affected())
    }

    async fn clear_all(&self) -> Result<u64, AppError> {
        let result = sqlx::query(r#"DELETE FROM queue_items"#)
            .execute(&self.pool)
            .await
            .map_err(queue_err)?;
        tracing::info!(dropped = result.rows_affected(), "Cleared all lanes");
        Ok(result.rows_affected())
    }
}
