//! Demo data seeding (feature `mock-api`)
//!
//! Creates three clients and leaves three transfers `pending` without
//! publishing them. The startup recovery pass then pushes them through the
//! normal pipeline, so seeded balances stay consistent with the ledger.

use rust_decimal::Decimal;
use tracing::info;

use crate::account::ClientService;
use crate::core_types::{ClientId, TransactionId};
use crate::ledger::LedgerStore;
use crate::transfer::{TransferError, TransferRequest};

const DEMO_CLIENTS: [(&str, i64); 3] = [("alice", 1000), ("bob", 500), ("carol", 750)];

/// (sender index, receiver index, amount) into `DEMO_CLIENTS`
const DEMO_TRANSFERS: [(usize, usize, i64); 3] = [(0, 1, 100), (1, 0, 50), (0, 2, 200)];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub clients: Vec<ClientId>,
    pub transactions: Vec<TransactionId>,
}

/// Seed an empty ledger. Returns `None` if clients already exist.
pub async fn seed_demo_data(
    clients: &ClientService,
    store: &dyn LedgerStore,
) -> Result<Option<SeedSummary>, TransferError> {
    // a fresh database hands out client id 1 first
    match store.get_client(1).await {
        Ok(_) => {
            info!("Ledger already has clients, skipping demo seed");
            return Ok(None);
        }
        Err(TransferError::ClientNotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let mut summary = SeedSummary::default();
    for (name, balance) in DEMO_CLIENTS {
        let id = clients.add_client(name, Decimal::from(balance)).await?;
        summary.clients.push(id);
    }

    for (from, to, amount) in DEMO_TRANSFERS {
        let request = TransferRequest::new(
            summary.clients[from],
            summary.clients[to],
            Decimal::from(amount),
        );
        request.validate()?;
        summary.transactions.push(store.add_transaction(&request).await?);
    }

    info!(
        clients = summary.clients.len(),
        transactions = summary.transactions.len(),
        "Demo data seeded"
    );
    Ok(Some(summary))
}
