use std::sync::Arc;

use crate::account::ClientService;
use crate::transfer::TransferOrchestrator;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TransferOrchestrator>,
    pub clients: Arc<ClientService>,
}

impl AppState {
    pub fn new(orchestrator: Arc<TransferOrchestrator>, clients: Arc<ClientService>) -> Self {
        Self {
            orchestrator,
            clients,
        }
    }
}
