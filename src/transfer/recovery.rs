//! Recovery Scanner
//!
//! Finite startup pass that re-publishes transactions a previous process left
//! unresolved:
//! - `pending`: never dequeued. Re-published, then marked `published`.
//! - `published`: re-published by an earlier pass but never consumed.
//! - `processing` older than the stale threshold: claimed by a worker that
//!   died before the atomic apply committed. Re-published as is.
//!
//! Re-publishing is safe because delivery is idempotent: the worker re-reads
//! the status and the apply short-circuits on a terminal transaction.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::ledger::Transaction;
use crate::queue::TransferMessage;

use super::error::TransferError;
use super::orchestrator::TransferOrchestrator;
use super::state::TransactionStatus;

/// Configuration for the recovery scanner
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// `processing` transactions untouched for this long are re-published.
    /// `None` disables the processing rescan.
    pub stale_processing_after: Option<Duration>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_processing_after: Some(Duration::from_secs(300)),
        }
    }
}

/// Counters for one recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub pending: usize,
    pub published: usize,
    pub stale_processing: usize,
    /// Messages successfully re-published
    pub republished: usize,
    /// Messages the queue refused; left for the next pass
    pub publish_failures: usize,
}

impl RecoveryReport {
    pub fn scanned(&self) -> usize {
        self.pending + self.published + self.stale_processing
    }
}

pub struct RecoveryScanner {
    orchestrator: Arc<TransferOrchestrator>,
    config: RecoveryConfig,
}

impl RecoveryScanner {
    pub fn new(orchestrator: Arc<TransferOrchestrator>, config: RecoveryConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(orchestrator: Arc<TransferOrchestrator>) -> Self {
        Self::new(orchestrator, RecoveryConfig::default())
    }

    /// Run a single recovery pass.
    ///
    /// Fails only if the store cannot be queried; individual publish failures
    /// are logged and counted.
    pub async fn run_once(&self) -> Result<RecoveryReport, TransferError> {
        let store = self.orchestrator.store();
        let mut report = RecoveryReport::default();

        // snapshot before the pending loop moves rows into `published`
        let published = store
            .get_transactions_by_status(TransactionStatus::Published)
            .await?;
        let pending = store
            .get_transactions_by_status(TransactionStatus::Pending)
            .await?;

        report.pending = pending.len();
        for transaction in &pending {
            if self.republish(transaction, &mut report).await {
                self.mark_published(transaction).await;
            }
        }

        report.published = published.len();
        for transaction in &published {
            self.republish(transaction, &mut report).await;
        }

        if let Some(threshold) = self.config.stale_processing_after {
            let cutoff = chrono::Duration::from_std(threshold)
                .ok()
                .and_then(|age| Utc::now().checked_sub_signed(age))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let stale = store
                .get_stale_transactions(TransactionStatus::Processing, cutoff)
                .await?;
            report.stale_processing = stale.len();
            for transaction in &stale {
                warn!(
                    transaction_id = transaction.id,
                    processed_at = ?transaction.processed_at,
                    "Re-driving stale processing transaction"
                );
                self.republish(transaction, &mut report).await;
            }
        }

        if report.scanned() == 0 {
            debug!("Recovery found nothing to re-publish");
        } else {
            info!(
                pending = report.pending,
                published = report.published,
                stale_processing = report.stale_processing,
                republished = report.republished,
                publish_failures = report.publish_failures,
                "Recovery pass finished"
            );
        }
        Ok(report)
    }

    async fn republish(&self, transaction: &Transaction, report: &mut RecoveryReport) -> bool {
        let message = TransferMessage::from_transaction(transaction);
        match self.orchestrator.queue().publish(message).await {
            Ok(()) => {
                debug!(transaction_id = transaction.id, status = %transaction.status, "Re-published");
                report.republished += 1;
                true
            }
            Err(e) => {
                error!(
                    transaction_id = transaction.id,
                    error = %e,
                    "Re-publish failed, left for next recovery pass"
                );
                report.publish_failures += 1;
                false
            }
        }
    }

    async fn mark_published(&self, transaction: &Transaction) {
        match self
            .orchestrator
            .store()
            .update_status_if(
                transaction.id,
                TransactionStatus::Pending,
                TransactionStatus::Published,
            )
            .await
        {
            Ok(true) => {}
            // a worker claimed it first
            Ok(false) => debug!(transaction_id = transaction.id, "Already moved past pending"),
            Err(e) => warn!(
                transaction_id = transaction.id,
                error = %e,
                "Failed to mark transaction published"
            ),
        }
    }
}
