//! Ledger data models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core_types::{ClientId, TransactionId};
use crate::transfer::state::TransactionStatus;

/// Account-like entity holding a balance (never negative)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    #[schema(value_type = String, example = "1000.00")]
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Client about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub name: String,
    pub balance: Decimal,
}

/// Persisted transfer between two clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub id: TransactionId,
    pub from_client_id: ClientId,
    pub to_client_id: ClientId,
    #[schema(value_type = String, example = "300.00")]
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    /// Unset until the transaction is claimed (`processing`) or terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// The two participants in ascending id order (row-lock order)
    pub fn lock_order(&self) -> (ClientId, ClientId) {
        if self.from_client_id <= self.to_client_id {
            (self.from_client_id, self.to_client_id)
        } else {
            (self.to_client_id, self.from_client_id)
        }
    }

    pub fn involves(&self, client_id: ClientId) -> bool {
        self.from_client_id == client_id || self.to_client_id == client_id
    }
}

/// Audit row written by the atomic apply, one per affected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionHistory {
    pub id: i64,
    pub transaction_id: TransactionId,
    pub client_id: ClientId,
    /// Signed balance change: negative for the sender, positive for the receiver
    #[schema(value_type = String, example = "-300.00")]
    pub delta: Decimal,
    #[schema(value_type = String)]
    pub balance_before: Decimal,
    #[schema(value_type = String)]
    pub balance_after: Decimal,
    pub status: TransactionStatus,
    pub event_time: DateTime<Utc>,
}
