//! Client operations: creation and lookups

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::core_types::ClientId;
use crate::ledger::{Client, LedgerStore, NewClient, TransactionHistory};
use crate::transfer::error::TransferError;
use crate::transfer::types::validate_amount;

use super::validation::ClientName;

pub struct ClientService {
    store: Arc<dyn LedgerStore>,
}

impl ClientService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Create a client with an opening balance (>= 0, at most 2 decimals)
    pub async fn add_client(&self, name: &str, balance: Decimal) -> Result<ClientId, TransferError> {
        let name = ClientName::new(name).map_err(|e| TransferError::InvalidRequest(e.to_string()))?;
        validate_amount(balance, true)?;

        let client_id = self
            .store
            .add_client(&NewClient {
                name: name.into_string(),
                balance,
            })
            .await?;
        info!(client_id, balance = %balance, "Client created");
        Ok(client_id)
    }

    pub async fn get_client(&self, client_id: ClientId) -> Result<Client, TransferError> {
        self.store.get_client(client_id).await
    }

    pub async fn get_client_balance(&self, client_id: ClientId) -> Result<Decimal, TransferError> {
        self.store.get_client_balance(client_id).await
    }

    /// Balance audit trail, oldest first. `ClientNotFound` for unknown ids.
    pub async fn get_history(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<TransactionHistory>, TransferError> {
        self.store.get_client(client_id).await?;
        self.store.get_history_by_client_id(client_id).await
    }
}
