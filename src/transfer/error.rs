//! Transfer Error Types
//!
//! Business outcomes (insufficient funds) are NOT errors on the apply path;
//! they come back as `ApplyOutcome`. This enum covers caller mistakes, missing
//! entities and infrastructure faults.

use thiserror::Error;

use crate::core_types::{ClientId, TransactionId};

use super::state::TransactionStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Caller Errors (never persisted) ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Missing Entities ===
    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    // === Business / Data ===
    #[error("Insufficient funds for transaction {0}")]
    InsufficientFunds(TransactionId),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStateTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    // === Infrastructure (retriable) ===
    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Failed to publish transaction {transaction_id}: {reason}")]
    QueuePublishFailed {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("Transfer queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidRequest(_) => "INVALID_REQUEST",
            TransferError::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            TransferError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            TransferError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            TransferError::Data(_) => "DATA_ERROR",
            TransferError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            TransferError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            TransferError::QueuePublishFailed { .. } => "QUEUE_PUBLISH_FAILED",
            TransferError::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidRequest(_) => 400,
            TransferError::ClientNotFound(_) | TransferError::TransactionNotFound(_) => 404,
            TransferError::InvalidStateTransition { .. } => 409,
            TransferError::InsufficientFunds(_) | TransferError::Data(_) => 422,
            TransferError::StoreUnavailable(_)
            | TransferError::QueuePublishFailed { .. }
            | TransferError::QueueUnavailable(_) => 503,
        }
    }

    /// Store or queue fault. The transaction must be left in a re-processable
    /// state and the message retried, never forced to a terminal status.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            TransferError::StoreUnavailable(_)
                | TransferError::QueuePublishFailed { .. }
                | TransferError::QueueUnavailable(_)
        )
    }
}

/// SQLSTATE class 22: the value itself is bad (overflow, bad format, ...)
fn is_data_exception(code: Option<&str>) -> bool {
    code.is_some_and(|c| c.starts_with("22"))
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err)
                if db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                    || db_err.is_unique_violation()
                    || is_data_exception(db_err.code().as_deref()) =>
            {
                TransferError::Data(db_err.message().to_string())
            }
            sqlx::Error::RowNotFound
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => TransferError::Data(e.to_string()),
            _ => TransferError::StoreUnavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TransferError::InvalidRequest("x".into()).code(),
            "INVALID_REQUEST"
        );
        assert_eq!(
            TransferError::InsufficientFunds(7).code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(
            TransferError::QueuePublishFailed {
                transaction_id: 1,
                reason: "closed".into()
            }
            .code(),
            "QUEUE_PUBLISH_FAILED"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::InvalidRequest("x".into()).http_status(), 400);
        assert_eq!(TransferError::ClientNotFound(1).http_status(), 404);
        assert_eq!(TransferError::InsufficientFunds(1).http_status(), 422);
        assert_eq!(
            TransferError::StoreUnavailable("down".into()).http_status(),
            503
        );
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(TransferError::StoreUnavailable("pool timeout".into()).is_infrastructure());
        assert!(TransferError::QueueUnavailable("closed".into()).is_infrastructure());
        assert!(!TransferError::InsufficientFunds(1).is_infrastructure());
        assert!(!TransferError::ClientNotFound(1).is_infrastructure());
        assert!(!TransferError::Data("fk".into()).is_infrastructure());
    }

    #[test]
    fn test_sqlx_mapping() {
        assert!(matches!(
            TransferError::from(sqlx::Error::RowNotFound),
            TransferError::Data(_)
        ));
        assert!(matches!(
            TransferError::from(sqlx::Error::PoolTimedOut),
            TransferError::StoreUnavailable(_)
        ));
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct PgFault {
        code: &'static str,
        message: &'static str,
    }

    impl sqlx::error::DatabaseError for PgFault {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.code.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(PgFault {
            code,
            message: "server said no",
        }))
    }

    #[test]
    fn test_sqlx_data_exception_is_not_infrastructure() {
        // 22003 numeric_value_out_of_range
        let err = TransferError::from(db_error("22003"));
        assert!(matches!(err, TransferError::Data(_)));
        assert!(!err.is_infrastructure());

        // 57P01 admin_shutdown
        let err = TransferError::from(db_error("57P01"));
        assert!(matches!(err, TransferError::StoreUnavailable(_)));
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_data_exception_class() {
        assert!(is_data_exception(Some("22003")));
        assert!(is_data_exception(Some("22P02")));
        assert!(!is_data_exception(Some("23505")));
        assert!(!is_data_exception(Some("08006")));
        assert!(!is_data_exception(None));
    }

    #[test]
    fn test_display() {
        let err = TransferError::InvalidStateTransition {
            from: TransactionStatus::Completed,
            to: TransactionStatus::Processing,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition: completed -> processing"
        );
    }
}
