//! Public-API scenarios for the transfer pipeline.
//!
//! Everything here goes through the crate's exported types with the
//! in-memory ledger and the channel queue, the same wiring `main` uses with
//! PostgreSQL swapped out.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use bank_transfer::account::ClientService;
use bank_transfer::transfer::{RecoveryConfig, WorkerConfig};
use bank_transfer::{
    ChannelQueue, ClientId, InMemoryLedgerStore, LedgerStore, RecoveryScanner, TransactionId,
    TransactionStatus, TransferError, TransferOrchestrator, TransferRequest, TransferWorker,
    shutdown_channel,
};

struct Bank {
    store: Arc<InMemoryLedgerStore>,
    clients: ClientService,
    orchestrator: Arc<TransferOrchestrator>,
}

impl Bank {
    fn new() -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let queue = Arc::new(ChannelQueue::new(128, 10, Duration::from_millis(5)));
        Self {
            clients: ClientService::new(store.clone()),
            orchestrator: Arc::new(TransferOrchestrator::new(store.clone(), queue)),
            store,
        }
    }

    async fn open(&self, name: &str, balance: &str) -> ClientId {
        self.clients
            .add_client(name, balance.parse().unwrap())
            .await
            .unwrap()
    }

    async fn balance(&self, id: ClientId) -> Decimal {
        self.clients.get_client_balance(id).await.unwrap()
    }

    /// Run the worker until every id is terminal
    async fn settle(&self, ids: &[TransactionId]) {
        let (trigger, shutdown) = shutdown_channel();
        let worker = TransferWorker::new(self.orchestrator.clone(), WorkerConfig { concurrency: 2 });
        let handle = tokio::spawn(async move { worker.run(shutdown).await });

        tokio::time::timeout(Duration::from_secs(5), async {
            'wait: loop {
                for id in ids {
                    let txn = self.orchestrator.get_transaction(*id).await.unwrap();
                    if !txn.status.is_terminal() {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        continue 'wait;
                    }
                }
                break;
            }
        })
        .await
        .expect("transfers did not settle");

        trigger.shutdown();
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn transfer_between_two_clients() {
    let bank = Bank::new();
    let a = bank.open("A", "1000").await;
    let b = bank.open("B", "500").await;

    let id = bank
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(300)))
        .await
        .unwrap();
    assert_eq!(
        bank.orchestrator.get_transaction(id).await.unwrap().status,
        TransactionStatus::Pending
    );

    bank.settle(&[id]).await;

    assert_eq!(
        bank.orchestrator.get_transaction(id).await.unwrap().status,
        TransactionStatus::Completed
    );
    assert_eq!(bank.balance(a).await, Decimal::from(700));
    assert_eq!(bank.balance(b).await, Decimal::from(800));
}

#[tokio::test]
async fn overdraft_is_refused() {
    let bank = Bank::new();
    let a = bank.open("A", "100").await;
    let b = bank.open("B", "0").await;

    let id = bank
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(300)))
        .await
        .unwrap();
    bank.settle(&[id]).await;

    assert_eq!(
        bank.orchestrator.get_transaction(id).await.unwrap().status,
        TransactionStatus::Failed
    );
    assert_eq!(bank.balance(a).await, Decimal::from(100));
    assert_eq!(bank.balance(b).await, Decimal::ZERO);
}

#[tokio::test]
async fn invalid_requests_are_not_persisted() {
    let bank = Bank::new();
    let a = bank.open("A", "100").await;
    let b = bank.open("B", "0").await;

    let cases = [
        TransferRequest::new(a, a, Decimal::from(10)),
        TransferRequest::new(a, b, Decimal::ZERO),
        TransferRequest::new(a, b, Decimal::from(-1)),
        TransferRequest::new(a, b, "0.005".parse().unwrap()),
    ];
    for request in cases {
        let err = bank.orchestrator.submit(request.clone()).await.unwrap_err();
        assert!(
            matches!(err, TransferError::InvalidRequest(_)),
            "{request:?} gave {err:?}"
        );
    }

    let err = bank
        .orchestrator
        .submit(TransferRequest::new(a, 999, Decimal::ONE))
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::ClientNotFound(999));
    assert!(
        bank.orchestrator
            .get_transactions_by_client_id(a)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn cents_are_exact() {
    let bank = Bank::new();
    let a = bank.open("A", "10.10").await;
    let b = bank.open("B", "0.05").await;

    let id = bank
        .orchestrator
        .submit(TransferRequest::new(a, b, "10.05".parse().unwrap()))
        .await
        .unwrap();
    bank.settle(&[id]).await;

    assert_eq!(bank.balance(a).await, "0.05".parse::<Decimal>().unwrap());
    assert_eq!(bank.balance(b).await, "10.10".parse::<Decimal>().unwrap());
}

#[tokio::test]
async fn restart_recovers_unpublished_transfers() {
    let bank = Bank::new();
    let a = bank.open("A", "1000").await;
    let b = bank.open("B", "0").await;

    // rows written by a process that died before publishing
    let mut ids = Vec::new();
    for amount in [100, 200, 300] {
        ids.push(
            bank.store
                .add_transaction(&TransferRequest::new(a, b, Decimal::from(amount)))
                .await
                .unwrap(),
        );
    }

    let report = RecoveryScanner::new(bank.orchestrator.clone(), RecoveryConfig::default())
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.pending, 3);
    assert_eq!(report.republished, 3);
    for id in &ids {
        assert_eq!(
            bank.orchestrator.get_transaction(*id).await.unwrap().status,
            TransactionStatus::Published
        );
    }

    bank.settle(&ids).await;
    assert_eq!(bank.balance(a).await, Decimal::from(400));
    assert_eq!(bank.balance(b).await, Decimal::from(600));

    // a second pass finds nothing left to do
    let report = RecoveryScanner::new(bank.orchestrator.clone(), RecoveryConfig::default())
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.scanned(), 0);
}

#[tokio::test]
async fn history_records_both_sides() {
    let bank = Bank::new();
    let a = bank.open("A", "50").await;
    let b = bank.open("B", "5").await;

    let ok = bank
        .orchestrator
        .submit(TransferRequest::new(a, b, Decimal::from(20)))
        .await
        .unwrap();
    let refused = bank
        .orchestrator
        .submit(TransferRequest::new(b, a, Decimal::from(100)))
        .await
        .unwrap();
    bank.settle(&[ok, refused]).await;

    let history_a = bank.clients.get_history(a).await.unwrap();
    assert_eq!(history_a.len(), 1);
    assert_eq!(history_a[0].delta, Decimal::from(-20));

    let history_b = bank.clients.get_history(b).await.unwrap();
    assert_eq!(history_b.len(), 2);
    assert!(
        history_b
            .iter()
            .any(|h| h.transaction_id == refused && h.delta.is_zero()
                && h.status == TransactionStatus::Failed)
    );
}
