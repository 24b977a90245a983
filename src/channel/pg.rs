//! PostgreSQL queue backend over `transfer_queue`
//!
//! Consumers claim rows with `FOR UPDATE SKIP LOCKED`, so several workers
//! (or processes) can share one queue without double delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::error::ChannelError;
use super::queue::{AckMode, Delivery, QueueBackend};

pub struct PgQueue {
    pool: PgPool,
    queue_name: String,
    /// How long a message received for after-processing ack stays hidden
    visibility_timeout: Duration,
    closed: AtomicBool,
}

impl PgQueue {
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
            visibility_timeout: Duration::from_secs(30),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn row_to_delivery(row: &sqlx::postgres::PgRow) -> Result<Delivery, ChannelError> {
        let attempts: i32 = row.try_get("attempts")?;
        Ok(Delivery {
            tag: row.try_get("id")?,
            body: row.try_get("body")?,
            attempts: attempts.max(0) as u32,
        })
    }
}

#[async_trait]
impl QueueBackend for PgQueue {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn enqueue(&self, body: Vec<u8>) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        sqlx::query("INSERT INTO transfer_queue (queue_name, body) VALUES ($1, $2)")
            .bind(&self.queue_name)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn receive(&self, mode: AckMode) -> Result<Option<Delivery>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let row = match mode {
            AckMode::OnReceipt => {
                sqlx::query(
                    r#"DELETE FROM transfer_queue
                       WHERE id = (
                           SELECT id FROM transfer_queue
                           WHERE queue_name = $1
                             AND (locked_until IS NULL OR locked_until < NOW())
                           ORDER BY id
                           FOR UPDATE SKIP LOCKED
                           LIMIT 1
                       )
                       RETURNING id, body, attempts + 1 AS attempts"#,
                )
                .bind(&self.queue_name)
                .fetch_optional(&self.pool)
                .await?
            }
            AckMode::AfterProcessing { .. } => {
                sqlx::query(
                    r#"UPDATE transfer_queue
                       SET attempts = attempts + 1,
                           locked_until = NOW() + make_interval(secs => $2)
                       WHERE id = (
                           SELECT id FROM transfer_queue
                           WHERE queue_name = $1
                             AND (locked_until IS NULL OR locked_until < NOW())
                           ORDER BY id
                           FOR UPDATE SKIP LOCKED
                           LIMIT 1
                       )
                       RETURNING id, body, attempts"#,
                )
                .bind(&self.queue_name)
                .bind(self.visibility_timeout.as_secs_f64())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(Self::row_to_delivery).transpose()
    }

    async fn ack(&self, tag: i64) -> Result<(), ChannelError> {
        sqlx::query("DELETE FROM transfer_queue WHERE id = $1")
            .bind(tag)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn nack(&self, tag: i64, requeue: bool) -> Result<(), ChannelError> {
        if requeue {
            sqlx::query("UPDATE transfer_queue SET locked_until = NULL WHERE id = $1")
                .bind(tag)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO transfer_dead_letters (id, queue_name, body, attempts, enqueued_at)
               SELECT id, queue_name, body, attempts, enqueued_at
               FROM transfer_queue WHERE id = $1
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(tag)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM transfer_queue WHERE id = $1")
            .bind(tag)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(queue = %self.queue_name, tag, "Message dead-lettered");
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
