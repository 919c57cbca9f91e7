use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::domain::{DexName, Order, OrderPatch, OrderStatus, OrderType, StateTransition};
use crate::error::{Result, SwapError};
use crate::persistence::OrderRepository;
use crate::queue::{
    ClaimedJob, EnqueueOutcome, JobDisposition, JobOptions, JobQueue, JobState, OrderJob,
    QueueCounts, STALLED_ERROR,
};

const ORDER_COLUMNS: &str = r#"
    id, order_type, token_in, token_out, amount_in, status, selected_dex,
    raydium_quote_price, meteora_quote_price, executed_price, amount_out,
    tx_hash, error_message, retry_count, created_at, updated_at, confirmed_at
"#;

/// PostgreSQL storage adapter: order records, their transition trail, and
/// the durable job queue.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let order_type: String = row.try_get("order_type")?;
        let status: String = row.try_get("status")?;
        let selected_dex: Option<String> = row.try_get("selected_dex")?;

        Ok(Order {
            id: row.try_get("id")?,
            order_type: OrderType::try_from(order_type.as_str()).map_err(SwapError::Internal)?,
            token_in: row.try_get("token_in")?,
            token_out: row.try_get("token_out")?,
            amount_in: row.try_get("amount_in")?,
            status: OrderStatus::try_from(status.as_str()).map_err(SwapError::Internal)?,
            selected_dex: selected_dex
                .map(|d| d.parse::<DexName>())
                .transpose()
                .map_err(SwapError::Internal)?,
            raydium_quote_price: row.try_get("raydium_quote_price")?,
            meteora_quote_price: row.try_get("meteora_quote_price")?,
            executed_price: row.try_get("executed_price")?,
            amount_out: row.try_get("amount_out")?,
            tx_hash: row.try_get("tx_hash")?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
        })
    }

    fn row_to_claimed(row: &PgRow) -> Result<ClaimedJob> {
        let Json(job): Json<OrderJob> = row.try_get("payload")?;
        let attempts_made: i32 = row.try_get("attempts_made")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;

        Ok(ClaimedJob {
            job,
            attempts_made: attempts_made.max(0) as u32,
            max_attempts: max_attempts.max(1) as u32,
        })
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Bound against `$n * INTERVAL '1 millisecond'`
fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

// ==================== Orders ====================

#[async_trait]
impl OrderRepository for PostgresStore {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_or_restart(&self, order: &Order) -> Result<Order> {
        let upsert = format!(
            r#"
            INSERT INTO orders (id, order_type, token_in, token_out, amount_in, status,
                                retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $6)
            ON CONFLICT (id) DO UPDATE SET
                order_type = EXCLUDED.order_type,
                token_in = EXCLUDED.token_in,
                token_out = EXCLUDED.token_out,
                amount_in = EXCLUDED.amount_in,
                status = 'pending',
                selected_dex = NULL,
                raydium_quote_price = NULL,
                meteora_quote_price = NULL,
                executed_price = NULL,
                amount_out = NULL,
                tx_hash = NULL,
                error_message = NULL,
                retry_count = 0,
                confirmed_at = NULL,
                updated_at = NOW()
            WHERE orders.status <> 'confirmed'
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let row = sqlx::query(&upsert)
            .bind(&order.id)
            .bind(order.order_type.as_str())
            .bind(&order.token_in)
            .bind(&order.token_out)
            .bind(order.amount_in)
            .bind(order.created_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_order(&row),
            // Conflict with a confirmed row: nothing was written
            None => {
                debug!("Order already confirmed, keeping existing row");
                self.find_by_id(&order.id)
                    .await?
                    .ok_or_else(|| SwapError::OrderNotFound(order.id.clone()))
            }
        }
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    #[instrument(skip(self, patch))]
    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        patch: &OrderPatch,
    ) -> Result<Order> {
        let query = format!(
            r#"
            UPDATE orders SET
                status = $2,
                selected_dex = COALESCE(selected_dex, $3),
                raydium_quote_price = COALESCE(raydium_quote_price, $4),
                meteora_quote_price = COALESCE(meteora_quote_price, $5),
                executed_price = COALESCE(executed_price, $6),
                amount_out = COALESCE(amount_out, $7),
                tx_hash = COALESCE(tx_hash, $8),
                error_message = COALESCE($9, error_message),
                confirmed_at = COALESCE(confirmed_at, $10),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(order_id)
            .bind(status.as_str())
            .bind(patch.selected_dex.map(|d| d.as_str()))
            .bind(patch.raydium_quote_price)
            .bind(patch.meteora_quote_price)
            .bind(patch.executed_price)
            .bind(patch.amount_out)
            .bind(patch.tx_hash.as_deref())
            .bind(patch.error_message.as_deref())
            .bind(patch.confirmed_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_order(&row),
            None => Err(SwapError::OrderNotFound(order_id.to_string())),
        }
    }

    async fn increment_retry_count(&self, order_id: &str) -> Result<i32> {
        let row = sqlx::query(
            r#"
            UPDATE orders SET retry_count = retry_count + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING retry_count
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.try_get("retry_count")?),
            None => Err(SwapError::OrderNotFound(order_id.to_string())),
        }
    }

    async fn append_event(&self, order_id: &str, transition: &StateTransition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_events (order_id, from_status, to_status, reason, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order_id)
        .bind(transition.from.map(|s| s.as_str()))
        .bind(transition.to.as_str())
        .bind(&transition.reason)
        .bind(transition.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ==================== Jobs ====================

#[async_trait]
impl JobQueue for PostgresStore {
    async fn enqueue(&self, job: &OrderJob, options: &JobOptions) -> Result<EnqueueOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_jobs (order_id, payload, state, attempts_made, max_attempts,
                                    backoff_ms, run_at, created_at)
            VALUES ($1, $2, 'waiting', 0, $3, $4, NOW(), NOW())
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(&job.order_id)
        .bind(Json(job))
        .bind(i32::try_from(options.attempts).unwrap_or(i32::MAX))
        .bind(millis(options.backoff))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(EnqueueOutcome::Duplicate)
        } else {
            Ok(EnqueueOutcome::Queued)
        }
    }

    async fn claim(&self) -> Result<Option<ClaimedJob>> {
        let row = sqlx::query(
            r#"
            UPDATE order_jobs SET
                state = 'active',
                attempts_made = attempts_made + 1,
                locked_at = NOW()
            WHERE order_id = (
                SELECT order_id FROM order_jobs
                WHERE state = 'waiting' AND run_at <= NOW()
                ORDER BY run_at, created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING payload, attempts_made, max_attempts
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_claimed).transpose()
    }

    async fn complete(&self, order_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_jobs SET state = 'completed', locked_at = NULL, finished_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, order_id: &str, error: &str) -> Result<JobDisposition> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT attempts_made, max_attempts, backoff_ms FROM order_jobs WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| SwapError::Queue(format!("Unknown job: {}", order_id)))?;

        let attempts_made: i32 = row.try_get("attempts_made")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;
        let backoff_ms: i64 = row.try_get("backoff_ms")?;

        let options = JobOptions {
            attempts: max_attempts.max(1) as u32,
            backoff: Duration::from_millis(backoff_ms.max(0) as u64),
        };
        let disposition = options.disposition_after_failure(attempts_made.max(0) as u32, Utc::now());

        match disposition {
            JobDisposition::RetryScheduled { run_at } => {
                sqlx::query(
                    r#"
                    UPDATE order_jobs SET state = 'waiting', run_at = $2, locked_at = NULL,
                                          last_error = $3
                    WHERE order_id = $1
                    "#,
                )
                .bind(order_id)
                .bind(run_at)
                .bind(error)
                .execute(&mut *tx)
                .await?;
            }
            JobDisposition::Dead => {
                sqlx::query(
                    r#"
                    UPDATE order_jobs SET state = 'failed', locked_at = NULL, last_error = $2,
                                          finished_at = NOW()
                    WHERE order_id = $1
                    "#,
                )
                .bind(order_id)
                .bind(error)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(disposition)
    }

    async fn extend_lock(&self, order_id: &str) -> Result<()> {
        sqlx::query("UPDATE order_jobs SET locked_at = NOW() WHERE order_id = $1 AND state = 'active'")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn requeue_stalled(&self, older_than: Duration) -> Result<u64> {
        let cutoff = as_millis_f64(older_than);
        let mut tx = self.pool.begin().await?;

        let failed = sqlx::query(
            r#"
            UPDATE order_jobs SET state = 'failed', locked_at = NULL, finished_at = NOW(),
                                  last_error = $2
            WHERE state = 'active'
              AND locked_at < NOW() - ($1 * INTERVAL '1 millisecond')
              AND attempts_made >= max_attempts
            "#,
        )
        .bind(cutoff)
        .bind(STALLED_ERROR)
        .execute(&mut *tx)
        .await?;

        let requeued = sqlx::query(
            r#"
            UPDATE order_jobs SET state = 'waiting', locked_at = NULL, run_at = NOW()
            WHERE state = 'active'
              AND locked_at < NOW() - ($1 * INTERVAL '1 millisecond')
            "#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(failed.rows_affected() + requeued.rows_affected())
    }

    async fn prune(&self, completed_older_than: Duration, failed_older_than: Duration) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM order_jobs
            WHERE (state = 'completed' AND finished_at < NOW() - ($1 * INTERVAL '1 millisecond'))
               OR (state = 'failed' AND finished_at < NOW() - ($2 * INTERVAL '1 millisecond'))
            "#,
        )
        .bind(as_millis_f64(completed_older_than))
        .bind(as_millis_f64(failed_older_than))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM order_jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let state: String = row.try_get("state")?;
            let n: i64 = row.try_get("n")?;
            if let Ok(state) = JobState::try_from(state.as_str()) {
                counts.add(state, n.max(0) as u64);
            }
        }
        Ok(counts)
    }

    async fn ping(&self) -> Result<()> {
        OrderRepository::ping(self).await
    }
}
