//! Bank Transfer - durable asynchronous client-to-client transfers
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (ClientId, TransactionId)
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup
//! - [`shutdown`] - Explicit shutdown signal
//! - [`db`] - PostgreSQL pool and schema bootstrap
//! - [`ledger`] - Ledger Store: clients, transactions, atomic apply
//! - [`queue`] - Transfer Queue: channel and PostgreSQL backends
//! - [`transfer`] - Orchestrator, worker, recovery scanner, status machine
//! - [`account`] - Client creation and lookups
//! - [`gateway`] - HTTP API

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod logging;
pub mod shutdown;

pub mod db;
pub mod ledger;
pub mod queue;
pub mod transfer;

pub mod account;
pub mod gateway;

#[cfg(feature = "mock-api")]
pub mod seed;

// Convenient re-exports at crate root
pub use core_types::{ClientId, TransactionId};
pub use ledger::{ApplyOutcome, InMemoryLedgerStore, LedgerStore, PgLedgerStore};
pub use queue::{ChannelQueue, PgQueue, TransferMessage, TransferQueue};
pub use shutdown::{Shutdown, ShutdownTrigger, shutdown_channel};
pub use transfer::{
    ProcessOutcome, RecoveryScanner, TransactionStatus, TransferError, TransferOrchestrator,
    TransferRequest, TransferWorker,
};
