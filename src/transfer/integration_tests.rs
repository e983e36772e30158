//! Pipeline tests: submit → queue → worker → ledger, plus crash recovery.
//!
//! Run against the in-memory store and the channel queue, so no database is
//! needed.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core_types::{ClientId, TransactionId};
use crate::ledger::{InMemoryLedgerStore, LedgerStore, NewClient};
use crate::queue::{ChannelQueue, TransferMessage, TransferQueue};
use crate::shutdown::{ShutdownTrigger, shutdown_channel};
use crate::transfer::{
    ProcessOutcome, RecoveryScanner, TransactionStatus, TransferError, TransferOrchestrator,
    TransferRequest, TransferWorker, WorkerConfig,
};

/// Wires store, queue and orchestrator the way `main` does
struct TestHarness {
    store: Arc<InMemoryLedgerStore>,
    queue: Arc<ChannelQueue>,
    orchestrator: Arc<TransferOrchestrator>,
}

impl TestHarness {
    fn new() -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let queue = Arc::new(ChannelQueue::new(256, 20, Duration::from_millis(5)));
        let orchestrator = Arc::new(TransferOrchestrator::new(store.clone(), queue.clone()));
        Self {
            store,
            queue,
            orchestrator,
        }
    }

    async fn client(&self, balance: i64) -> ClientId {
        self.store
            .add_client(&NewClient {
                name: format!("client-{balance}"),
                balance: Decimal::from(balance),
            })
            .await
            .unwrap()
    }

    async fn balance(&self, client_id: ClientId) -> Decimal {
        self.store.get_client_balance(client_id).await.unwrap()
    }

    async fn status(&self, transaction_id: TransactionId) -> TransactionStatus {
        self.store
            .get_transaction(transaction_id)
            .await
            .unwrap()
            .status
    }

    fn start_worker(&self, concurrency: usize) -> (ShutdownTrigger, JoinHandle<()>) {
        let (trigger, shutdown) = shutdown_channel();
        let worker = TransferWorker::new(self.orchestrator.clone(), WorkerConfig { concurrency });
        let handle = tokio::spawn(async move { worker.run(shutdown).await });
        (trigger, handle)
    }

    async fn wait_terminal(&self, ids: &[TransactionId]) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let mut all = true;
                for id in ids {
                    if !self.status(*id).await.is_terminal() {
                        all = false;
                        break;
                    }
                }
                if all {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("transactions did not reach a terminal state");
    }
}

async fn stop(trigger: ShutdownTrigger, handle: JoinHandle<()>) {
    trigger.shutdown();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}

// ========================================================================
// Scenarios
// ========================================================================

#[tokio::test]
async fn test_transfer_completes_end_to_end() {
    let h = TestHarness::new();
    let a = h.client(1000).await;
    let b = h.client(500).await;
    let (trigger, handle) = h.start_worker(1);

    let id = h
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(300)))
        .await
        .unwrap();
    h.wait_terminal(&[id]).await;
    stop(trigger, handle).await;

    assert_eq!(h.status(id).await, TransactionStatus::Completed);
    assert_eq!(h.balance(a).await, Decimal::from(700));
    assert_eq!(h.balance(b).await, Decimal::from(800));

    let txn = h.orchestrator.get_transaction(id).await.unwrap();
    assert!(txn.processed_at.is_some());

    let sender_history = h.store.get_history_by_client_id(a).await.unwrap();
    assert_eq!(sender_history.len(), 1);
    assert_eq!(sender_history[0].balance_before, Decimal::from(1000));
    assert_eq!(sender_history[0].balance_after, Decimal::from(700));
}

#[tokio::test]
async fn test_insufficient_funds_ends_failed() {
    let h = TestHarness::new();
    let a = h.client(100).await;
    let b = h.client(50).await;
    let (trigger, handle) = h.start_worker(1);

    let id = h
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(300)))
        .await
        .unwrap();
    h.wait_terminal(&[id]).await;
    stop(trigger, handle).await;

    assert_eq!(h.status(id).await, TransactionStatus::Failed);
    assert_eq!(h.balance(a).await, Decimal::from(100));
    assert_eq!(h.balance(b).await, Decimal::from(50));
}

#[tokio::test]
async fn test_self_transfer_rejected_without_persisting() {
    let h = TestHarness::new();
    let a = h.client(100).await;

    let err = h
        .orchestrator
        .submit(TransferRequest::new(a, a, Decimal::from(10)))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::InvalidRequest(_)));
    assert!(h.store.get_transactions_by_client_id(a).await.unwrap().is_empty());
}

// ========================================================================
// Properties
// ========================================================================

#[tokio::test]
async fn test_conservation_under_concurrent_workers() {
    let h = TestHarness::new();
    let clients = [h.client(500).await, h.client(300).await, h.client(200).await];
    let total_before = h.store.total_balance().await;
    let (trigger, handle) = h.start_worker(4);

    let mut ids = Vec::new();
    for round in 0..30usize {
        let from = clients[round % 3];
        let to = clients[(round + 1) % 3];
        let amount = Decimal::from(10 + (round as i64 % 7) * 15);
        ids.push(
            h.orchestrator
                .submit(TransferRequest::new(from, to, amount))
                .await
                .unwrap(),
        );
    }
    h.wait_terminal(&ids).await;
    stop(trigger, handle).await;

    assert_eq!(h.store.total_balance().await, total_before);
    for client in clients {
        assert!(h.balance(client).await >= Decimal::ZERO, "negative balance");
    }

    // every completed transfer moved exactly its amount
    for client in clients {
        for entry in h.store.get_history_by_client_id(client).await.unwrap() {
            assert_eq!(entry.balance_before + entry.delta, entry.balance_after);
        }
    }
}

#[tokio::test]
async fn test_redelivery_mutates_balances_once() {
    let h = TestHarness::new();
    let a = h.client(1000).await;
    let b = h.client(0).await;

    let id = h
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(250)))
        .await
        .unwrap();
    // duplicate of the already queued message
    let duplicate = h.store.get_transaction(id).await.unwrap();
    h.queue
        .publish(TransferMessage::from_transaction(&duplicate))
        .await
        .unwrap();
    assert_eq!(h.queue.depth(), 2);

    let (trigger, handle) = h.start_worker(2);
    h.wait_terminal(&[id]).await;
    tokio::time::timeout(Duration::from_secs(2), async {
        while h.queue.depth() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue not drained");
    stop(trigger, handle).await;

    assert_eq!(h.balance(a).await, Decimal::from(750));
    assert_eq!(h.balance(b).await, Decimal::from(250));
    assert_eq!(h.store.get_history_by_client_id(b).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_terminal_status_is_final() {
    let h = TestHarness::new();
    let a = h.client(1000).await;
    let b = h.client(0).await;
    let id = h
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(1)))
        .await
        .unwrap();
    let message = h.queue.try_recv().await.unwrap();
    h.orchestrator.process_delivery(&message).await.unwrap();

    for status in TransactionStatus::ALL {
        let result = h.orchestrator.update_transaction_status(id, status).await;
        assert!(
            matches!(result, Err(TransferError::InvalidStateTransition { .. })),
            "completed -> {status} must be rejected"
        );
    }
    assert_eq!(
        h.orchestrator.process_delivery(&message).await.unwrap(),
        ProcessOutcome::AlreadyProcessed(TransactionStatus::Completed)
    );
}

#[tokio::test]
async fn test_recovery_completes_orphaned_transactions() {
    let h = TestHarness::new();
    let a = h.client(1000).await;
    let b = h.client(0).await;

    // previous process: persisted but crashed before publish
    let mut orphans = Vec::new();
    for _ in 0..3 {
        orphans.push(
            h.store
                .add_transaction(&TransferRequest::new(a, b, Decimal::from(100)))
                .await
                .unwrap(),
        );
    }
    // previous process: claimed, crashed before the apply committed
    let claimed = h
        .store
        .add_transaction(&TransferRequest::new(a, b, Decimal::from(100)))
        .await
        .unwrap();
    h.store
        .update_transaction_status(claimed, TransactionStatus::Processing)
        .await
        .unwrap();
    h.store
        .set_processed_at(claimed, chrono::Utc::now() - chrono::Duration::minutes(30))
        .await
        .unwrap();

    let report = RecoveryScanner::with_defaults(h.orchestrator.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.pending, 3);
    assert_eq!(report.stale_processing, 1);
    assert_eq!(report.publish_failures, 0);

    let (trigger, handle) = h.start_worker(1);
    let mut all = orphans.clone();
    all.push(claimed);
    h.wait_terminal(&all).await;
    stop(trigger, handle).await;

    for id in all {
        assert_eq!(h.status(id).await, TransactionStatus::Completed);
    }
    assert_eq!(h.balance(a).await, Decimal::from(600));
    assert_eq!(h.balance(b).await, Decimal::from(400));
}

#[tokio::test]
async fn test_store_outage_is_retried_by_queue() {
    let h = TestHarness::new();
    let a = h.client(1000).await;
    let b = h.client(0).await;

    h.store.set_apply_unavailable(true);
    let (trigger, handle) = h.start_worker(1);
    let id = h
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(10)))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while h.status(id).await != TransactionStatus::Processing {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("transaction never claimed");
    h.store.set_apply_unavailable(false);

    h.wait_terminal(&[id]).await;
    stop(trigger, handle).await;
    assert_eq!(h.status(id).await, TransactionStatus::Completed);
    assert_eq!(h.balance(b).await, Decimal::from(10));
}

#[tokio::test]
async fn test_receiver_overflow_fails_without_retry() {
    let h = TestHarness::new();
    let a = h.client(100).await;
    let b = h
        .store
        .add_client(&NewClient {
            name: "whale".into(),
            balance: "999999999999999999.50".parse().unwrap(),
        })
        .await
        .unwrap();
    let (trigger, handle) = h.start_worker(1);

    let id = h
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(1)))
        .await
        .unwrap();
    h.wait_terminal(&[id]).await;
    stop(trigger, handle).await;

    // out-of-range credit is a data error: failed once, not redelivered
    assert_eq!(h.status(id).await, TransactionStatus::Failed);
    assert_eq!(h.store.apply_calls(), 1);
    assert_eq!(h.balance(a).await, Decimal::from(100));
    assert_eq!(
        h.balance(b).await,
        "999999999999999999.50".parse::<Decimal>().unwrap()
    );
}
