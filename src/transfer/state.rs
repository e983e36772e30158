//! Transaction Status State Machine
//!
//! ```text
//! PENDING → PUBLISHED → PROCESSING → COMPLETED
//!    │          │            └──────→ FAILED
//!    └──────────┴──→ PROCESSING
//! ```
//!
//! `PUBLISHED` only marks a transaction re-queued by the recovery scanner.
//! Every non-terminal status is processable by the worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Transaction status, stored as lowercase text in PostgreSQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Persisted by submit, not yet dequeued
    Pending,
    /// Re-published by the recovery scanner
    Published,
    /// Claimed by a worker; balances not yet applied
    Processing,
    /// Terminal: balances moved
    Completed,
    /// Terminal: rejected (insufficient funds or bad data), balances untouched
    Failed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 5] = [
        TransactionStatus::Pending,
        TransactionStatus::Published,
        TransactionStatus::Processing,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
    ];

    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed
        )
    }

    /// Position along the forward path; terminal states share the last rank
    fn rank(&self) -> u8 {
        match self {
            TransactionStatus::Pending => 0,
            TransactionStatus::Published => 1,
            TransactionStatus::Processing => 2,
            TransactionStatus::Completed | TransactionStatus::Failed => 3,
        }
    }

    /// Whether a status write from `self` to `next` keeps the machine monotonic.
    ///
    /// Re-writing the same non-terminal status is allowed (a redelivered
    /// message claims an already `processing` transaction again). `completed`
    /// is never a plain write: only the atomic apply commits it, together
    /// with the balance movement.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        if self.is_terminal() || next == TransactionStatus::Completed {
            return false;
        }
        next.rank() >= self.rank()
    }

    /// Statuses from which a write of `next` is legal
    pub fn predecessors_of(next: TransactionStatus) -> Vec<TransactionStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// Whether the write also stamps `processed_at`
    #[inline]
    pub fn stamps_processed_at(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Processing
                | TransactionStatus::Completed
                | TransactionStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Published => "published",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "published" => Ok(TransactionStatus::Published),
            "processing" => Ok(TransactionStatus::Processing),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    #[test]
    fn test_terminal_states() {
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());

        assert!(!Pending.is_terminal());
        assert!(!Published.is_terminal());
        assert!(!Processing.is_terminal());
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        for next in TransactionStatus::ALL {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(Pending.can_transition_to(Published));
        assert!(Pending.can_transition_to(Processing));
        assert!(Published.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));
    }

    #[test]
    fn test_completed_is_not_writable() {
        for from in TransactionStatus::ALL {
            assert!(!from.can_transition_to(Completed), "{from}");
        }
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!Processing.can_transition_to(Published));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Published.can_transition_to(Pending));
    }

    #[test]
    fn test_predecessors() {
        assert_eq!(
            TransactionStatus::predecessors_of(Published),
            vec![Pending, Published]
        );
        assert_eq!(
            TransactionStatus::predecessors_of(Failed),
            vec![Pending, Published, Processing]
        );
        assert!(TransactionStatus::predecessors_of(Completed).is_empty());
    }

    #[test]
    fn test_parse_and_display() {
        for status in TransactionStatus::ALL {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        assert_eq!("COMPLETED".parse::<TransactionStatus>(), Ok(Completed));
        assert!("done".parse::<TransactionStatus>().is_err());
        assert_eq!(Processing.to_string(), "processing");
    }

    #[test]
    fn test_processed_at_stamping() {
        assert!(!Pending.stamps_processed_at());
        assert!(!Published.stamps_processed_at());
        assert!(Processing.stamps_processed_at());
        assert!(Completed.stamps_processed_at());
    }
}
