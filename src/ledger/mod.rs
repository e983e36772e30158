//! Ledger: clients, transactions and the atomic transfer apply

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::InMemoryLedgerStore;
pub use models::{Client, NewClient, Transaction, TransactionHistory};
pub use postgres::PgLedgerStore;
pub use store::{ApplyOutcome, LedgerStore};
