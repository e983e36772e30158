//! In-process Transfer Queue
//!
//! Bounded tokio mpsc channel. The receiver sits behind a mutex so several
//! consumer tasks can share it. Not durable across restarts; the startup
//! recovery pass re-publishes whatever was lost.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::shutdown::Shutdown;
use crate::transfer::error::TransferError;

use super::{DeliveryHandler, Disposition, TransferMessage, TransferQueue, disposition};

/// Message plus the number of times it has been delivered
#[derive(Debug)]
struct Envelope {
    message: TransferMessage,
    attempt: u32,
}

pub struct ChannelQueue {
    tx: mpsc::Sender<Envelope>,
    rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    max_redeliveries: u32,
    redelivery_delay: Duration,
}

impl ChannelQueue {
    pub fn new(capacity: usize, max_redeliveries: u32, redelivery_delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            max_redeliveries,
            redelivery_delay,
        }
    }

    /// Messages currently buffered
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Pop one buffered message without delivering it to a handler
    pub async fn try_recv(&self) -> Option<TransferMessage> {
        self.rx.lock().await.try_recv().ok().map(|e| e.message)
    }

    /// Stop accepting new messages. Buffered messages can still be consumed.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }

    async fn dispatch(&self, handler: &dyn DeliveryHandler, envelope: Envelope) {
        let Envelope { message, attempt } = envelope;
        let result = handler.handle(&message).await;

        match disposition(&result, attempt, self.max_redeliveries) {
            Disposition::Ack => {
                debug!(transaction_id = message.transaction_id, attempt, "Message acknowledged");
            }
            Disposition::Redeliver => {
                warn!(
                    transaction_id = message.transaction_id,
                    attempt,
                    delay_ms = self.redelivery_delay.as_millis() as u64,
                    "Delivery failed, scheduling redelivery"
                );
                let tx = self.tx.clone();
                let delay = self.redelivery_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let transaction_id = message.transaction_id;
                    let envelope = Envelope {
                        message,
                        attempt: attempt + 1,
                    };
                    if let Err(e) = tx.send(envelope).await {
                        // recovery re-publishes the transaction on next start
                        error!(transaction_id, "Redelivery lost: {}", e);
                    }
                });
            }
            Disposition::Drop => {
                if let Err(e) = result {
                    error!(
                        transaction_id = message.transaction_id,
                        attempt,
                        "Dropping message: {}",
                        e
                    );
                }
            }
        }
    }
}

#[async_trait]
impl TransferQueue for ChannelQueue {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn publish(&self, message: TransferMessage) -> Result<(), TransferError> {
        let transaction_id = message.transaction_id;
        let envelope = Envelope {
            message,
            attempt: 1,
        };
        self.tx.try_send(envelope).map_err(|e| {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "queue closed",
            };
            TransferError::QueuePublishFailed {
                transaction_id,
                reason: reason.to_string(),
            }
        })
    }

    async fn consume(
        &self,
        handler: Arc<dyn DeliveryHandler>,
        mut shutdown: Shutdown,
    ) -> Result<(), TransferError> {
        loop {
            let next = {
                let mut rx = tokio::select! {
                    _ = shutdown.wait() => break,
                    rx = self.rx.lock() => rx,
                };
                tokio::select! {
                    _ = shutdown.wait() => break,
                    envelope = rx.recv() => envelope,
                }
            };

            match next {
                Some(envelope) => self.dispatch(handler.as_ref(), envelope).await,
                None => {
                    info!("Transfer channel closed, consumer exiting");
                    break;
                }
            }
        }
        Ok(())
    }
}
