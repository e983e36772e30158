//! In-memory Ledger Store
//!
//! Implements the same contract as the PostgreSQL store behind one async
//! mutex, which stands in for row locks: every call is its own isolated unit
//! of work. Used by tests and local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::core_types::{ClientId, TransactionId};
use crate::transfer::error::TransferError;
use crate::transfer::state::TransactionStatus;
use crate::transfer::types::{TransferRequest, amount_limit};

use super::models::{Client, NewClient, Transaction, TransactionHistory};
use super::store::{ApplyOutcome, LedgerStore};

#[derive(Default)]
struct LedgerState {
    clients: BTreeMap<ClientId, Client>,
    transactions: BTreeMap<TransactionId, Transaction>,
    history: Vec<TransactionHistory>,
    next_client_id: ClientId,
    next_transaction_id: TransactionId,
}

impl LedgerState {
    fn transaction_mut(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<&mut Transaction, TransferError> {
        self.transactions
            .get_mut(&transaction_id)
            .ok_or(TransferError::TransactionNotFound(transaction_id))
    }

    fn record(
        &mut self,
        transaction_id: TransactionId,
        client_id: ClientId,
        delta: Decimal,
        balance_before: Decimal,
        status: TransactionStatus,
    ) {
        let id = self.history.len() as i64 + 1;
        self.history.push(TransactionHistory {
            id,
            transaction_id,
            client_id,
            delta,
            balance_before,
            balance_after: balance_before + delta,
            status,
            event_time: Utc::now(),
        });
    }
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
    /// Every call fails with `StoreUnavailable`
    unavailable: AtomicBool,
    /// Only `process_transaction` fails with `StoreUnavailable`
    apply_unavailable: AtomicBool,
    apply_calls: AtomicUsize,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the database being unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulate a connection drop in the middle of the atomic apply
    pub fn set_apply_unavailable(&self, unavailable: bool) {
        self.apply_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `process_transaction` calls that reached the ledger
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Sum of all client balances (conservation checks)
    pub async fn total_balance(&self) -> Decimal {
        let state = self.state.lock().await;
        state.clients.values().map(|c| c.balance).sum()
    }

    /// Overwrite `processed_at` (ages a transaction for stale-rescan tests)
    pub async fn set_processed_at(
        &self,
        transaction_id: TransactionId,
        processed_at: DateTime<Utc>,
    ) -> Result<(), TransferError> {
        let mut state = self.state.lock().await;
        state.transaction_mut(transaction_id)?.processed_at = Some(processed_at);
        Ok(())
    }

    fn check_available(&self) -> Result<(), TransferError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransferError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn filter_transactions<F>(&self, predicate: F) -> Result<Vec<Transaction>, TransferError>
    where
        F: Fn(&Transaction) -> bool + Send,
    {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .filter(|t| predicate(t))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add_client(&self, client: &NewClient) -> Result<ClientId, TransferError> {
        self.check_available()?;
        if client.balance.is_sign_negative() {
            return Err(TransferError::Data("balance must not be negative".to_string()));
        }
        let mut state = self.state.lock().await;
        state.next_client_id += 1;
        let id = state.next_client_id;
        state.clients.insert(
            id,
            Client {
                id,
                name: client.name.clone(),
                balance: client.balance,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_client(&self, client_id: ClientId) -> Result<Client, TransferError> {
        self.check_available()?;
        let state = self.state.lock().await;
        state
            .clients
            .get(&client_id)
            .cloned()
            .ok_or(TransferError::ClientNotFound(client_id))
    }

    async fn get_client_balance(&self, client_id: ClientId) -> Result<Decimal, TransferError> {
        Ok(self.get_client(client_id).await?.balance)
    }

    async fn add_transaction(
        &self,
        request: &TransferRequest,
    ) -> Result<TransactionId, TransferError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        for client_id in [request.from_client_id, request.to_client_id] {
            if !state.clients.contains_key(&client_id) {
                return Err(TransferError::ClientNotFound(client_id));
            }
        }

        state.next_transaction_id += 1;
        let id = state.next_transaction_id;
        state.transactions.insert(
            id,
            Transaction {
                id,
                from_client_id: request.from_client_id,
                to_client_id: request.to_client_id,
                amount: request.amount,
                status: TransactionStatus::Pending,
                created_at: Utc::now(),
                processed_at: None,
            },
        );
        Ok(id)
    }

    async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Transaction, TransferError> {
        self.check_available()?;
        let state = self.state.lock().await;
        state
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or(TransferError::TransactionNotFound(transaction_id))
    }

    async fn get_transactions_by_client_id(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.filter_transactions(|t| t.involves(client_id)).await
    }

    async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.filter_transactions(|t| t.status == status).await
    }

    async fn get_transactions_by_status_and_client_id(
        &self,
        client_id: ClientId,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.filter_transactions(|t| t.status == status && t.involves(client_id))
            .await
    }

    async fn get_stale_transactions(
        &self,
        status: TransactionStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.filter_transactions(|t| {
            t.status == status && t.processed_at.is_some_and(|at| at < cutoff)
        })
        .await
    }

    async fn update_transaction_status(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), TransferError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let transaction = state.transaction_mut(transaction_id)?;
        if !transaction.status.can_transition_to(status) {
            return Err(TransferError::InvalidStateTransition {
                from: transaction.status,
                to: status,
            });
        }
        transaction.status = status;
        if status.stamps_processed_at() {
            transaction.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_status_if(
        &self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        new_status: TransactionStatus,
    ) -> Result<bool, TransferError> {
        self.check_available()?;
        if !expected.can_transition_to(new_status) {
            return Err(TransferError::InvalidStateTransition {
                from: expected,
                to: new_status,
            });
        }
        let mut state = self.state.lock().await;
        let Some(transaction) = state.transactions.get_mut(&transaction_id) else {
            return Ok(false);
        };
        if transaction.status != expected {
            return Ok(false);
        }
        transaction.status = new_status;
        if new_status.stamps_processed_at() {
            transaction.processed_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn process_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<ApplyOutcome, TransferError> {
        self.check_available()?;
        if self.apply_unavailable.load(Ordering::SeqCst) {
            return Err(TransferError::StoreUnavailable(
                "connection lost during apply".to_string(),
            ));
        }
        self.apply_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().await;

        let current = state.transaction_mut(transaction.id)?.status;
        if current.is_terminal() {
            return Ok(ApplyOutcome::AlreadyApplied(current));
        }

        let (first, second) = transaction.lock_order();
        for client_id in [first, second] {
            if !state.clients.contains_key(&client_id) {
                return Err(TransferError::ClientNotFound(client_id));
            }
        }

        let sender_balance = state.clients[&transaction.from_client_id].balance;
        let receiver_balance = state.clients[&transaction.to_client_id].balance;
        let now = Utc::now();

        if sender_balance < transaction.amount {
            let record = state.transaction_mut(transaction.id)?;
            record.status = TransactionStatus::Failed;
            record.processed_at = Some(now);
            state.record(
                transaction.id,
                transaction.from_client_id,
                Decimal::ZERO,
                sender_balance,
                TransactionStatus::Failed,
            );
            return Ok(ApplyOutcome::InsufficientFunds);
        }

        // NUMERIC(20,2) overflow aborts the whole apply, as Postgres does
        if receiver_balance + transaction.amount >= amount_limit() {
            return Err(TransferError::Data(format!(
                "balance of client {} out of range",
                transaction.to_client_id
            )));
        }

        if let Some(sender) = state.clients.get_mut(&transaction.from_client_id) {
            sender.balance -= transaction.amount;
        }
        if let Some(receiver) = state.clients.get_mut(&transaction.to_client_id) {
            receiver.balance += transaction.amount;
        }
        let record = state.transaction_mut(transaction.id)?;
        record.status = TransactionStatus::Completed;
        record.processed_at = Some(now);
        state.record(
            transaction.id,
            transaction.from_client_id,
            -transaction.amount,
            sender_balance,
            TransactionStatus::Completed,
        );
        state.record(
            transaction.id,
            transaction.to_client_id,
            transaction.amount,
            receiver_balance,
            TransactionStatus::Completed,
        );

        Ok(ApplyOutcome::Completed)
    }

    async fn get_history_by_client_id(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<TransactionHistory>, TransferError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), TransferError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(a: i64, b: i64) -> (InMemoryLedgerStore, ClientId, ClientId) {
        let store = InMemoryLedgerStore::new();
        let a = store
            .add_client(&NewClient {
                name: "A".into(),
                balance: Decimal::from(a),
            })
            .await
            .unwrap();
        let b = store
            .add_client(&NewClient {
                name: "B".into(),
                balance: Decimal::from(b),
            })
            .await
            .unwrap();
        (store, a, b)
    }

    async fn pending(store: &InMemoryLedgerStore, from: ClientId, to: ClientId, amount: i64) -> Transaction {
        let id = store
            .add_transaction(&TransferRequest::new(from, to, Decimal::from(amount)))
            .await
            .unwrap();
        store.get_transaction(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_apply_conserves_total_balance() {
        let (store, a, b) = seeded(1000, 500).await;
        let txn = pending(&store, a, b, 300).await;

        assert_eq!(
            store.process_transaction(&txn).await.unwrap(),
            ApplyOutcome::Completed
        );
        assert_eq!(store.get_client_balance(a).await.unwrap(), Decimal::from(700));
        assert_eq!(store.get_client_balance(b).await.unwrap(), Decimal::from(800));
        assert_eq!(store.total_balance().await, Decimal::from(1500));

        let stored = store.get_transaction(txn.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert!(stored.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let (store, a, b) = seeded(1000, 0).await;
        let txn = pending(&store, a, b, 100).await;

        store.process_transaction(&txn).await.unwrap();
        let second = store.process_transaction(&txn).await.unwrap();
        assert_eq!(
            second,
            ApplyOutcome::AlreadyApplied(TransactionStatus::Completed)
        );
        assert_eq!(store.get_client_balance(a).await.unwrap(), Decimal::from(900));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_balances() {
        let (store, a, b) = seeded(100, 5).await;
        let txn = pending(&store, a, b, 300).await;

        assert_eq!(
            store.process_transaction(&txn).await.unwrap(),
            ApplyOutcome::InsufficientFunds
        );
        assert_eq!(store.get_client_balance(a).await.unwrap(), Decimal::from(100));
        assert_eq!(store.get_client_balance(b).await.unwrap(), Decimal::from(5));
        assert_eq!(
            store.get_transaction(txn.id).await.unwrap().status,
            TransactionStatus::Failed
        );

        let history = store.get_history_by_client_id(a).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].delta, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_exact_balance_can_be_spent() {
        let (store, a, b) = seeded(300, 0).await;
        let txn = pending(&store, a, b, 300).await;
        assert_eq!(
            store.process_transaction(&txn).await.unwrap(),
            ApplyOutcome::Completed
        );
        assert_eq!(store.get_client_balance(a).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_client_rejected_on_add() {
        let (store, a, _) = seeded(10, 0).await;
        let err = store
            .add_transaction(&TransferRequest::new(a, 99, Decimal::ONE))
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::ClientNotFound(99));
        assert!(
            store
                .get_transactions_by_client_id(a)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_status_writes_are_monotonic() {
        let (store, a, b) = seeded(10, 0).await;
        let txn = pending(&store, a, b, 1).await;

        store
            .update_transaction_status(txn.id, TransactionStatus::Processing)
            .await
            .unwrap();
        let err = store
            .update_transaction_status(txn.id, TransactionStatus::Published)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidStateTransition { .. }));

        let err = store
            .update_transaction_status(404, TransactionStatus::Processing)
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::TransactionNotFound(404));
    }

    #[tokio::test]
    async fn test_update_status_if_is_compare_and_set() {
        let (store, a, b) = seeded(10, 0).await;
        let txn = pending(&store, a, b, 1).await;

        assert!(
            store
                .update_status_if(txn.id, TransactionStatus::Pending, TransactionStatus::Published)
                .await
                .unwrap()
        );
        assert!(
            !store
                .update_status_if(txn.id, TransactionStatus::Pending, TransactionStatus::Published)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_queries_by_status_and_client() {
        let (store, a, b) = seeded(100, 0).await;
        let c = store
            .add_client(&NewClient {
                name: "C".into(),
                balance: Decimal::ZERO,
            })
            .await
            .unwrap();
        let t1 = pending(&store, a, b, 1).await;
        pending(&store, a, c, 1).await;
        store.process_transaction(&t1).await.unwrap();

        assert_eq!(store.get_transactions_by_client_id(b).await.unwrap().len(), 1);
        assert_eq!(store.get_transactions_by_client_id(a).await.unwrap().len(), 2);
        assert_eq!(
            store
                .get_transactions_by_status(TransactionStatus::Pending)
                .await
                .unwrap()
                .len(),
            1
        );
        let completed_for_a = store
            .get_transactions_by_status_and_client_id(a, TransactionStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed_for_a.len(), 1);
        assert_eq!(completed_for_a[0].id, t1.id);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let (store, a, _) = seeded(10, 0).await;
        store.set_unavailable(true);
        assert!(matches!(
            store.get_client(a).await,
            Err(TransferError::StoreUnavailable(_))
        ));
        assert!(store.health_check().await.is_err());
        store.set_unavailable(false);
        assert!(store.health_check().await.is_ok());
    }
}
