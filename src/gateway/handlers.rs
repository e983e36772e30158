//! HTTP handlers over the orchestrator and client service

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::core_types::{ClientId, TransactionId};
use crate::ledger::{Client, Transaction, TransactionHistory};
use crate::transfer::{TransactionStatus, TransferRequest};

use super::state::AppState;
use super::types::{
    ApiError, ApiResponse, ApiResult, BalanceData, CreateClientData, CreateClientRequest,
    HealthResponse, StatusQuery, SubmitTransferData, UpdateStatusRequest, accepted, ok,
    parse_status,
};

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {timestamp_ms}}
/// - Unhealthy: 503 Service Unavailable, no internal details exposed
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    if let Err(e) = state.orchestrator.store().health_check().await {
        tracing::error!(error = %e, "[HEALTH] ledger store ping failed");
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            super::types::error_codes::SERVICE_UNAVAILABLE,
            "unavailable",
        ));
    }
    ok(HealthResponse {
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    })
}

// ============================================================================
// Clients
// ============================================================================

#[utoipa::path(
    post,
    path = "/api/v1/clients",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client created", body = CreateClientData),
        (status = 400, description = "Invalid name or balance")
    ),
    tag = "Clients"
)]
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateClientRequest>,
) -> ApiResult<CreateClientData> {
    let client_id = state.clients.add_client(&req.name, req.balance).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreateClientData { client_id })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}",
    params(("id" = i64, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Client", body = Client),
        (status = 404, description = "Client not found")
    ),
    tag = "Clients"
)]
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ClientId>,
) -> ApiResult<Client> {
    ok(state.clients.get_client(id).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}/balance",
    params(("id" = i64, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Current balance", body = BalanceData),
        (status = 404, description = "Client not found")
    ),
    tag = "Clients"
)]
pub async fn get_client_balance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ClientId>,
) -> ApiResult<BalanceData> {
    let balance = state.clients.get_client_balance(id).await?;
    ok(BalanceData {
        client_id: id,
        balance,
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}/history",
    params(("id" = i64, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Balance audit trail, oldest first", body = Vec<TransactionHistory>),
        (status = 404, description = "Client not found")
    ),
    tag = "Clients"
)]
pub async fn get_client_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ClientId>,
) -> ApiResult<Vec<TransactionHistory>> {
    ok(state.clients.get_history(id).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}/transactions",
    params(("id" = i64, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Transactions sent or received by the client", body = Vec<Transaction>)
    ),
    tag = "Transactions"
)]
pub async fn get_client_transactions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ClientId>,
) -> ApiResult<Vec<Transaction>> {
    ok(state.orchestrator.get_transactions_by_client_id(id).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}/transactions/{status}",
    params(
        ("id" = i64, Path, description = "Client ID"),
        ("status" = String, Path, description = "pending | published | processing | completed | failed")
    ),
    responses(
        (status = 200, description = "Client transactions in the given status", body = Vec<Transaction>),
        (status = 400, description = "Unknown status")
    ),
    tag = "Transactions"
)]
pub async fn get_client_transactions_by_status(
    State(state): State<Arc<AppState>>,
    Path((id, status)): Path<(ClientId, String)>,
) -> ApiResult<Vec<Transaction>> {
    let status = parse_status(&status)?;
    ok(state
        .orchestrator
        .get_transactions_by_status_and_client_id(id, status)
        .await?)
}

// ============================================================================
// Transactions
// ============================================================================

/// Submit a transfer
///
/// Returns 202: the transfer is `pending` and will be applied by the worker.
/// A 503 with code QUEUE_PUBLISH_FAILED means the transaction was stored but
/// not queued; it is re-published on the next startup.
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = TransferRequest,
    responses(
        (status = 202, description = "Transfer accepted", body = SubmitTransferData),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Client not found"),
        (status = 503, description = "Store or queue unavailable")
    ),
    tag = "Transactions"
)]
pub async fn submit_transfer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<SubmitTransferData> {
    let transaction_id = state.orchestrator.submit(req).await?;
    accepted(SubmitTransferData {
        transaction_id,
        status: TransactionStatus::Pending,
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    params(("id" = i64, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Transaction", body = Transaction),
        (status = 404, description = "Transaction not found")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TransactionId>,
) -> ApiResult<Transaction> {
    ok(state.orchestrator.get_transaction(id).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(StatusQuery),
    responses(
        (status = 200, description = "Transactions in the given status", body = Vec<Transaction>),
        (status = 400, description = "Missing or unknown status")
    ),
    tag = "Transactions"
)]
pub async fn get_transactions_by_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Vec<Transaction>> {
    let raw = query
        .status
        .ok_or_else(|| ApiError::bad_request("status query parameter is required"))?;
    let status = parse_status(&raw)?;
    ok(state.orchestrator.get_transactions_by_status(status).await?)
}

#[utoipa::path(
    put,
    path = "/api/v1/transactions/{id}/status",
    params(("id" = i64, Path, description = "Transaction ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = Transaction),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Transition not allowed (terminal, backwards, or `completed`)")
    ),
    tag = "Transactions"
)]
pub async fn update_transaction_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TransactionId>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Transaction> {
    let status = parse_status(&req.status)?;
    state
        .orchestrator
        .update_transaction_status(id, status)
        .await?;
    ok(state.orchestrator.get_transaction(id).await?)
}
