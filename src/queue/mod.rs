//! Transfer Queue
//!
//! Durable at-least-once hand-off between submit/recovery and the workers.
//! Publishers never touch balances; consumers deliver each message to a
//! [`DeliveryHandler`] and acknowledge it only after the handler returns.
//!
//! Delivery rules shared by every backend:
//! - `Ok(())` acknowledges the message.
//! - An infrastructure error (`TransferError::is_infrastructure`) schedules a
//!   redelivery after a delay, up to the configured attempt limit.
//! - Any other error is logged and the message is dropped; the handler has
//!   already recorded the outcome on the transaction.

pub mod channel;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core_types::{ClientId, TransactionId};
use crate::ledger::Transaction;
use crate::shutdown::Shutdown;
use crate::transfer::error::TransferError;

pub use channel::ChannelQueue;
pub use postgres::{PgQueue, PgQueueConfig};

/// Message carried on the Transfer Queue. The transaction id is the
/// idempotency key; the remaining fields let a consumer log without a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub message_id: Uuid,
    pub transaction_id: TransactionId,
    pub from_client_id: ClientId,
    pub to_client_id: ClientId,
    pub amount: Decimal,
    pub enqueued_at: DateTime<Utc>,
}

impl TransferMessage {
    pub fn new(
        transaction_id: TransactionId,
        from_client_id: ClientId,
        to_client_id: ClientId,
        amount: Decimal,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            transaction_id,
            from_client_id,
            to_client_id,
            amount,
            enqueued_at: Utc::now(),
        }
    }

    pub fn from_transaction(transaction: &Transaction) -> Self {
        Self::new(
            transaction.id,
            transaction.from_client_id,
            transaction.to_client_id,
            transaction.amount,
        )
    }
}

/// Consumer-side callback invoked once per delivery
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, message: &TransferMessage) -> Result<(), TransferError>;
}

#[async_trait]
pub trait TransferQueue: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Enqueue a message. Fails with `QueuePublishFailed` if the queue did
    /// not accept it; the caller keeps the transaction recoverable.
    async fn publish(&self, message: TransferMessage) -> Result<(), TransferError>;

    /// Deliver messages to `handler` until `shutdown` fires.
    ///
    /// Safe to call from several tasks at once; each call is one consumer.
    async fn consume(
        &self,
        handler: Arc<dyn DeliveryHandler>,
        shutdown: Shutdown,
    ) -> Result<(), TransferError>;
}

/// What a consumer does with a delivery after the handler returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Ack,
    Redeliver,
    Drop,
}

/// Shared redelivery decision. `attempt` counts deliveries made so far,
/// starting at 1.
pub(crate) fn disposition(
    result: &Result<(), TransferError>,
    attempt: u32,
    max_redeliveries: u32,
) -> Disposition {
    match result {
        Ok(()) => Disposition::Ack,
        Err(e) if e.is_infrastructure() && attempt <= max_redeliveries => Disposition::Redeliver,
        Err(_) => Disposition::Drop,
    }
}
