//! Ledger Store contract
//!
//! The orchestrator only talks to the store through this trait so it can be
//! driven against PostgreSQL in production and an in-memory double in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core_types::{ClientId, TransactionId};
use crate::transfer::error::TransferError;
use crate::transfer::state::TransactionStatus;
use crate::transfer::types::TransferRequest;

use super::models::{Client, NewClient, Transaction, TransactionHistory};

/// Result of the atomic apply. Only `Err` is exceptional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Balances moved, transaction `completed`
    Completed,
    /// Sender balance below amount, transaction `failed`, balances untouched
    InsufficientFunds,
    /// Transaction was already terminal when the lock was taken; nothing changed
    AlreadyApplied(TransactionStatus),
}

impl ApplyOutcome {
    /// Terminal status the transaction holds after the call
    pub fn status(&self) -> TransactionStatus {
        match self {
            ApplyOutcome::Completed => TransactionStatus::Completed,
            ApplyOutcome::InsufficientFunds => TransactionStatus::Failed,
            ApplyOutcome::AlreadyApplied(status) => *status,
        }
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    // === Clients ===

    async fn add_client(&self, client: &NewClient) -> Result<ClientId, TransferError>;

    async fn get_client(&self, client_id: ClientId) -> Result<Client, TransferError>;

    async fn get_client_balance(&self, client_id: ClientId) -> Result<Decimal, TransferError>;

    // === Transactions ===

    /// Persist a new transaction as `pending`.
    ///
    /// Fails with `ClientNotFound` if either participant is absent.
    async fn add_transaction(
        &self,
        request: &TransferRequest,
    ) -> Result<TransactionId, TransferError>;

    async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Transaction, TransferError>;

    /// All transactions where the client is sender or receiver
    async fn get_transactions_by_client_id(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Transaction>, TransferError>;

    async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransferError>;

    async fn get_transactions_by_status_and_client_id(
        &self,
        client_id: ClientId,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransferError>;

    /// Transactions in `status` whose `processed_at` is before `cutoff`
    async fn get_stale_transactions(
        &self,
        status: TransactionStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransferError>;

    /// Write a new status.
    ///
    /// `TransactionNotFound` if absent; `InvalidStateTransition` if the write
    /// would leave a terminal state or move backwards.
    async fn update_transaction_status(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), TransferError>;

    /// Atomic CAS: write `new_status` only if the current status is `expected`.
    ///
    /// Returns true if the update happened.
    async fn update_status_if(
        &self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        new_status: TransactionStatus,
    ) -> Result<bool, TransferError>;

    /// Atomic apply: the only operation that mutates balances.
    ///
    /// Within one unit of work: lock the transaction row, short-circuit if it is
    /// already terminal, lock both clients in ascending id order, then either
    /// fail the transaction (insufficient funds) or move the amount and
    /// complete it. Any error leaves balances and status untouched.
    async fn process_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<ApplyOutcome, TransferError>;

    /// Audit rows for a client, oldest first
    async fn get_history_by_client_id(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<TransactionHistory>, TransferError>;

    async fn health_check(&self) -> Result<(), TransferError>;
}
