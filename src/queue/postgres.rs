//! PostgreSQL-backed Transfer Queue
//!
//! Messages live in the `transfer_queue` table. A consumer claims the oldest
//! available row with `FOR UPDATE SKIP LOCKED` and keeps the row lock while the
//! handler runs, so a message is never delivered to two consumers at once and
//! a crashed consumer releases it for redelivery.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::shutdown::Shutdown;
use crate::transfer::error::TransferError;

use super::{DeliveryHandler, Disposition, TransferMessage, TransferQueue, disposition};

#[derive(Debug, Clone)]
pub struct PgQueueConfig {
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    pub max_redeliveries: u32,
    pub redelivery_delay: Duration,
}

impl Default for PgQueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            max_redeliveries: 5,
            redelivery_delay: Duration::from_millis(500),
        }
    }
}

pub struct PgQueue {
    pool: PgPool,
    config: PgQueueConfig,
}

fn queue_unavailable(e: sqlx::Error) -> TransferError {
    TransferError::QueueUnavailable(e.to_string())
}

impl PgQueue {
    pub fn new(pool: PgPool, config: PgQueueConfig) -> Self {
        Self { pool, config }
    }

    /// Rows waiting for delivery, including ones scheduled for later
    pub async fn depth(&self) -> Result<i64, TransferError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transfer_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(queue_unavailable)
    }

    /// Claim and deliver at most one message. Returns false if nothing was available.
    pub async fn poll_once(&self, handler: &dyn DeliveryHandler) -> Result<bool, TransferError> {
        let mut tx = self.pool.begin().await.map_err(queue_unavailable)?;

        let row = sqlx::query(
            r#"
            SELECT id, attempts, payload
            FROM transfer_queue
            WHERE available_at <= NOW()
            ORDER BY id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(queue_unavailable)?;

        let Some(row) = row else {
            tx.commit().await.map_err(queue_unavailable)?;
            return Ok(false);
        };

        let id: i64 = row.try_get("id").map_err(queue_unavailable)?;
        let attempts: i32 = row.try_get("attempts").map_err(queue_unavailable)?;
        let payload: String = row.try_get("payload").map_err(queue_unavailable)?;

        let message: TransferMessage = match serde_json::from_str(&payload) {
            Ok(m) => m,
            Err(e) => {
                error!(queue_id = id, "Dropping undecodable queue row: {}", e);
                sqlx::query("DELETE FROM transfer_queue WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(queue_unavailable)?;
                tx.commit().await.map_err(queue_unavailable)?;
                return Ok(true);
            }
        };

        let attempt = attempts.max(0) as u32 + 1;
        let result = handler.handle(&message).await;

        match disposition(&result, attempt, self.config.max_redeliveries) {
            Disposition::Ack => {
                debug!(transaction_id = message.transaction_id, attempt, "Message acknowledged");
                sqlx::query("DELETE FROM transfer_queue WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(queue_unavailable)?;
            }
            Disposition::Redeliver => {
                warn!(
                    transaction_id = message.transaction_id,
                    attempt, "Delivery failed, scheduling redelivery"
                );
                sqlx::query(
                    r#"
                    UPDATE transfer_queue
                    SET attempts = attempts + 1,
                        available_at = NOW() + make_interval(secs => $2)
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(self.config.redelivery_delay.as_secs_f64())
                .execute(&mut *tx)
                .await
                .map_err(queue_unavailable)?;
            }
            Disposition::Drop => {
                if let Err(e) = &result {
                    error!(
                        transaction_id = message.transaction_id,
                        attempt, "Dropping message: {}", e
                    );
                }
                sqlx::query("DELETE FROM transfer_queue WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(queue_unavailable)?;
            }
        }

        tx.commit().await.map_err(queue_unavailable)?;
        Ok(true)
    }
}

#[async_trait]
impl TransferQueue for PgQueue {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn publish(&self, message: TransferMessage) -> Result<(), TransferError> {
        let transaction_id = message.transaction_id;
        let publish_failed = |reason: String| TransferError::QueuePublishFailed {
            transaction_id,
            reason,
        };

        let payload = serde_json::to_string(&message).map_err(|e| publish_failed(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO transfer_queue (message_id, transaction_id, payload, enqueued_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(message.message_id)
        .bind(transaction_id)
        .bind(payload)
        .bind(message.enqueued_at)
        .execute(&self.pool)
        .await
        .map_err(|e| publish_failed(e.to_string()))?;

        debug!(transaction_id, message_id = %message.message_id, "Message published");
        Ok(())
    }

    async fn consume(
        &self,
        handler: Arc<dyn DeliveryHandler>,
        mut shutdown: Shutdown,
    ) -> Result<(), TransferError> {
        info!("PostgreSQL queue consumer started");

        while !shutdown.is_shutdown() {
            match self.poll_once(handler.as_ref()).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!("Queue poll error: {}", e),
            }

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("PostgreSQL queue consumer stopped");
        Ok(())
    }
}
