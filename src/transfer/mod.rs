//! Asynchronous client-to-client transfers
//!
//! # Flow
//!
//! ```text
//! submit ──► store.add_transaction (pending) ──► queue.publish
//!                                                    │
//!            worker ◄─────────── consume ◄───────────┘
//!              │
//!              ├─ re-read status (terminal → skip)
//!              ├─ status = processing
//!              └─ store.process_transaction (completed | failed)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Persist-Before-Publish**: a transaction is durable as `pending` before
//!    any message about it exists.
//! 2. **Single Mutation Point**: balances change only inside the atomic apply.
//! 3. **Idempotent Delivery**: a terminal transaction is never applied again.
//! 4. **Forward-Only Status**: nothing leaves `completed` or `failed`.

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;
pub mod types;
pub mod worker;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use error::TransferError;
pub use orchestrator::{ProcessOutcome, TransferOrchestrator};
pub use recovery::{RecoveryConfig, RecoveryReport, RecoveryScanner};
pub use state::TransactionStatus;
pub use types::TransferRequest;
pub use worker::{TransferWorker, WorkerConfig};
