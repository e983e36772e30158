//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::types::{
    BalanceData, CreateClientData, CreateClientRequest, HealthResponse, SubmitTransferData,
    UpdateStatusRequest,
};
use crate::ledger::{Client, Transaction, TransactionHistory};
use crate::transfer::{TransactionStatus, TransferRequest};

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bank Transfer API",
        version = "0.1.0",
        description = "Asynchronous client-to-client transfers. Submissions are accepted as `pending` and applied by a background worker.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_client,
        crate::gateway::handlers::get_client,
        crate::gateway::handlers::get_client_balance,
        crate::gateway::handlers::get_client_history,
        crate::gateway::handlers::get_client_transactions,
        crate::gateway::handlers::get_client_transactions_by_status,
        crate::gateway::handlers::submit_transfer,
        crate::gateway::handlers::get_transaction,
        crate::gateway::handlers::get_transactions_by_status,
        crate::gateway::handlers::update_transaction_status,
    ),
    components(
        schemas(
            HealthResponse,
            Client,
            Transaction,
            TransactionHistory,
            TransactionStatus,
            TransferRequest,
            CreateClientRequest,
            CreateClientData,
            BalanceData,
            SubmitTransferData,
            UpdateStatusRequest,
        )
    ),
    tags(
        (name = "System", description = "Health"),
        (name = "Clients", description = "Client accounts and balances"),
        (name = "Transactions", description = "Transfer submission and status")
    )
)]
pub struct ApiDoc;
