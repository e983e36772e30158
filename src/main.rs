//! Bank Transfer service
//!
//! ```text
//! ┌─────────┐  submit   ┌──────────┐  publish  ┌───────┐  consume  ┌────────┐
//! │ Gateway │─────────▶│  Ledger  │─────────▶│ Queue │─────────▶│ Worker │
//! │ (axum)  │          │(pending) │          │       │          │ (apply)│
//! └─────────┘          └──────────┘          └───────┘          └────────┘
//!                            ▲                    ▲
//!                            └──── Recovery ──────┘  (once, at startup)
//! ```

use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info, warn};

use bank_transfer::account::ClientService;
use bank_transfer::config::{AppConfig, QueueBackend};
use bank_transfer::db::Database;
use bank_transfer::gateway::{self, state::AppState};
use bank_transfer::ledger::{LedgerStore, PgLedgerStore};
use bank_transfer::logging::init_logging;
use bank_transfer::queue::{ChannelQueue, PgQueue, PgQueueConfig, TransferQueue};
use bank_transfer::shutdown::shutdown_channel;
use bank_transfer::transfer::{
    RecoveryConfig, RecoveryScanner, TransferOrchestrator, TransferWorker, WorkerConfig,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[cfg(feature = "mock-api")]
async fn seed(clients: &ClientService, store: &dyn LedgerStore) -> anyhow::Result<()> {
    bank_transfer::seed::seed_demo_data(clients, store)
        .await
        .context("Failed to seed demo data")?;
    Ok(())
}

#[cfg(not(feature = "mock-api"))]
async fn seed(_clients: &ClientService, _store: &dyn LedgerStore) -> anyhow::Result<()> {
    warn!("seed.enabled is set but the mock-api feature is off; skipping");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config)?;
    info!(env = %env, "Starting bank transfer service");

    // ========================================================================
    // Storage
    // ========================================================================
    let db = Database::connect(&config.postgres_url, config.postgres_max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.init_schema()
        .await
        .context("Failed to initialize schema")?;

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db.pool().clone()));
    let queue: Arc<dyn TransferQueue> = match config.queue.backend {
        QueueBackend::Channel => Arc::new(ChannelQueue::new(
            config.queue.capacity,
            config.queue.max_redeliveries,
            config.queue.redelivery_delay(),
        )),
        QueueBackend::Postgres => Arc::new(PgQueue::new(
            db.pool().clone(),
            PgQueueConfig {
                poll_interval: config.queue.poll_interval(),
                max_redeliveries: config.queue.max_redeliveries,
                redelivery_delay: config.queue.redelivery_delay(),
            },
        )),
    };
    info!(store = store.name(), queue = queue.name(), "Pipeline backends ready");

    let orchestrator = Arc::new(TransferOrchestrator::new(store.clone(), queue));
    let clients = Arc::new(ClientService::new(store.clone()));

    if config.seed.enabled {
        seed(&clients, store.as_ref()).await?;
    }

    // ========================================================================
    // Recovery (once, before the worker starts)
    // ========================================================================
    let scanner = RecoveryScanner::new(
        orchestrator.clone(),
        RecoveryConfig {
            stale_processing_after: config.recovery.stale_processing_after(),
        },
    );
    match scanner.run_once().await {
        Ok(report) => info!(
            scanned = report.scanned(),
            republished = report.republished,
            publish_failures = report.publish_failures,
            "Startup recovery done"
        ),
        // transactions stay in the store; the next start retries
        Err(e) => warn!(error = %e, "Startup recovery failed"),
    }

    // ========================================================================
    // Worker + Gateway
    // ========================================================================
    let (trigger, shutdown) = shutdown_channel();

    let worker = TransferWorker::new(
        orchestrator.clone(),
        WorkerConfig {
            concurrency: config.worker.concurrency,
        },
    );
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

    let state = Arc::new(AppState::new(orchestrator, clients));
    let server_shutdown = shutdown.clone();
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let mut server_handle =
        tokio::spawn(async move { gateway::run_server(&host, port, state, server_shutdown).await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown requested");
            trigger.shutdown();
            match (&mut server_handle).await {
                Ok(Err(e)) => error!(error = %e, "Gateway stopped with error"),
                Err(e) => error!(error = %e, "Gateway task failed"),
                Ok(Ok(())) => {}
            }
        }
        joined = &mut server_handle => {
            trigger.shutdown();
            match joined {
                Ok(Ok(())) => warn!("Gateway exited"),
                Ok(Err(e)) => error!(error = %e, "Gateway failed"),
                Err(e) => error!(error = %e, "Gateway task failed"),
            }
        }
    }

    if let Err(e) = worker_handle.await {
        error!(error = %e, "Worker task failed");
    }
    info!("Bank transfer service stopped");
    Ok(())
}
