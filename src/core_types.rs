//! Core types used throughout the system
//!
//! Identifiers are assigned by the ledger store (PostgreSQL `BIGSERIAL`),
//! so they are signed to match the column type without casts.

/// Client ID - assigned on creation, never reused.
///
/// # Usage:
/// - Primary key of `clients`
/// - Lock ordering key during atomic apply (ascending)
pub type ClientId = i64;

/// Transaction ID - assigned when a transfer is first persisted as `pending`
pub type TransactionId = i64;
