//! Transfer Worker
//!
//! Long-running consumer bound to the Transfer Queue. Runs `concurrency`
//! consume loops, each handing deliveries to the orchestrator, and returns
//! once the shutdown signal fires and every loop has drained.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::queue::{DeliveryHandler, TransferMessage};
use crate::shutdown::Shutdown;

use super::error::TransferError;
use super::orchestrator::TransferOrchestrator;

/// Configuration for the transfer worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent consume loops
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Adapts the orchestrator to the queue's delivery callback
struct OrchestratorHandler {
    orchestrator: Arc<TransferOrchestrator>,
}

#[async_trait]
impl DeliveryHandler for OrchestratorHandler {
    async fn handle(&self, message: &TransferMessage) -> Result<(), TransferError> {
        let outcome = self.orchestrator.process_delivery(message).await?;
        debug!(
            transaction_id = message.transaction_id,
            status = %outcome.status(),
            "Delivery handled"
        );
        Ok(())
    }
}

pub struct TransferWorker {
    orchestrator: Arc<TransferOrchestrator>,
    config: WorkerConfig,
}

impl TransferWorker {
    pub fn new(orchestrator: Arc<TransferOrchestrator>, config: WorkerConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(orchestrator: Arc<TransferOrchestrator>) -> Self {
        Self::new(orchestrator, WorkerConfig::default())
    }

    /// Consume until `shutdown` fires.
    ///
    /// A consume loop that ends with an error is logged; it does not stop
    /// the other loops.
    pub async fn run(&self, shutdown: Shutdown) {
        let concurrency = self.config.concurrency.max(1);
        let queue = self.orchestrator.queue().clone();
        let handler: Arc<dyn DeliveryHandler> = Arc::new(OrchestratorHandler {
            orchestrator: self.orchestrator.clone(),
        });

        info!(concurrency, queue = queue.name(), "Starting transfer worker");

        let mut loops = JoinSet::new();
        for index in 0..concurrency {
            let queue = queue.clone();
            let handler = handler.clone();
            let shutdown = shutdown.clone();
            loops.spawn(async move { (index, queue.consume(handler, shutdown).await) });
        }

        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok((index, Ok(()))) => debug!(index, "Consume loop stopped"),
                Ok((index, Err(e))) => error!(index, error = %e, "Consume loop failed"),
                Err(e) => error!(error = %e, "Consume loop panicked"),
            }
        }

        info!("Transfer worker stopped");
    }
}
