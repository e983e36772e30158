//! Transaction Orchestrator
//!
//! Submits transfers (persist `pending`, then publish) and processes queued
//! deliveries against the Ledger Store. Balances only ever change inside
//! [`LedgerStore::process_transaction`].

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core_types::{ClientId, TransactionId};
use crate::ledger::{ApplyOutcome, LedgerStore, Transaction};
use crate::queue::{TransferMessage, TransferQueue};

use super::error::TransferError;
use super::state::TransactionStatus;
use super::types::TransferRequest;

/// Non-exceptional result of processing one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Funds moved, transaction `completed`
    Completed,
    /// Sender could not cover the amount, transaction `failed`
    InsufficientFunds,
    /// Apply refused the transaction for a data reason, transaction `failed`
    Rejected(String),
    /// Transaction was already terminal; nothing changed
    AlreadyProcessed(TransactionStatus),
}

impl ProcessOutcome {
    pub fn status(&self) -> TransactionStatus {
        match self {
            ProcessOutcome::Completed => TransactionStatus::Completed,
            ProcessOutcome::InsufficientFunds | ProcessOutcome::Rejected(_) => {
                TransactionStatus::Failed
            }
            ProcessOutcome::AlreadyProcessed(status) => *status,
        }
    }
}

pub struct TransferOrchestrator {
    store: Arc<dyn LedgerStore>,
    queue: Arc<dyn TransferQueue>,
}

impl TransferOrchestrator {
    pub fn new(store: Arc<dyn LedgerStore>, queue: Arc<dyn TransferQueue>) -> Self {
        Self { store, queue }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn TransferQueue> {
        &self.queue
    }

    /// Persist a transfer as `pending` and publish it.
    ///
    /// Invalid requests are rejected before anything is written. If the
    /// publish fails the transaction stays `pending` and the error carries
    /// its id; the Recovery Scanner re-publishes it later.
    pub async fn submit(&self, request: TransferRequest) -> Result<TransactionId, TransferError> {
        request.validate()?;

        let transaction_id = self.store.add_transaction(&request).await?;
        info!(
            transaction_id,
            from = request.from_client_id,
            to = request.to_client_id,
            amount = %request.amount,
            "Transfer submitted"
        );

        let message = TransferMessage::new(
            transaction_id,
            request.from_client_id,
            request.to_client_id,
            request.amount,
        );
        if let Err(e) = self.queue.publish(message).await {
            warn!(transaction_id, error = %e, "Publish failed, left pending for recovery");
            return Err(match e {
                e @ TransferError::QueuePublishFailed { .. } => e,
                other => TransferError::QueuePublishFailed {
                    transaction_id,
                    reason: other.to_string(),
                },
            });
        }

        Ok(transaction_id)
    }

    pub async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Transaction, TransferError> {
        self.store.get_transaction(transaction_id).await
    }

    pub async fn get_transactions_by_client_id(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.store.get_transactions_by_client_id(client_id).await
    }

    pub async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.store.get_transactions_by_status(status).await
    }

    pub async fn get_transactions_by_status_and_client_id(
        &self,
        client_id: ClientId,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.store
            .get_transactions_by_status_and_client_id(client_id, status)
            .await
    }

    /// Forward-only status write (terminal states never change).
    ///
    /// `completed` is refused: only the atomic apply may commit it.
    pub async fn update_transaction_status(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), TransferError> {
        self.store
            .update_transaction_status(transaction_id, status)
            .await?;
        info!(transaction_id, status = %status, "Transaction status updated");
        Ok(())
    }

    /// Handle one queue delivery.
    ///
    /// 1. Re-read the status; terminal means duplicate delivery.
    /// 2. Claim the transaction (`processing`).
    /// 3. Atomic apply, which writes the terminal status itself.
    /// 4. Data errors fail the transaction. Infrastructure errors leave it
    ///    `processing` and are returned so the queue can redeliver.
    pub async fn process_delivery(
        &self,
        message: &TransferMessage,
    ) -> Result<ProcessOutcome, TransferError> {
        let transaction_id = message.transaction_id;

        let transaction = self.store.get_transaction(transaction_id).await?;
        if transaction.status.is_terminal() {
            debug!(
                transaction_id,
                status = %transaction.status,
                "Duplicate delivery, already terminal"
            );
            return Ok(ProcessOutcome::AlreadyProcessed(transaction.status));
        }

        match self
            .store
            .update_transaction_status(transaction_id, TransactionStatus::Processing)
            .await
        {
            Ok(()) => {}
            // another consumer finished it between the read and the claim
            Err(TransferError::InvalidStateTransition { from, .. }) if from.is_terminal() => {
                return Ok(ProcessOutcome::AlreadyProcessed(from));
            }
            Err(e) => return Err(e),
        }

        match self.store.process_transaction(&transaction).await {
            Ok(ApplyOutcome::Completed) => {
                info!(
                    transaction_id,
                    from = transaction.from_client_id,
                    to = transaction.to_client_id,
                    amount = %transaction.amount,
                    "Transfer completed"
                );
                Ok(ProcessOutcome::Completed)
            }
            Ok(ApplyOutcome::InsufficientFunds) => {
                warn!(transaction_id, "Transfer failed: insufficient funds");
                Ok(ProcessOutcome::InsufficientFunds)
            }
            Ok(ApplyOutcome::AlreadyApplied(status)) => {
                debug!(transaction_id, status = %status, "Apply short-circuited");
                Ok(ProcessOutcome::AlreadyProcessed(status))
            }
            Err(e) if e.is_infrastructure() => {
                error!(transaction_id, error = %e, "Apply failed, left processing");
                Err(e)
            }
            Err(e) => {
                warn!(transaction_id, error = %e, "Apply rejected, failing transaction");
                self.store
                    .update_transaction_status(transaction_id, TransactionStatus::Failed)
                    .await?;
                Ok(ProcessOutcome::Rejected(e.to_string()))
            }
        }
    }
}
