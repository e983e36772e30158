//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError`: error half of every handler result
//! - `error_codes`: Standard error code constants
//! - Request and response DTOs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::core_types::{ClientId, TransactionId};
use crate::transfer::{TransactionStatus, TransferError};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// HTTP error rendered as an `ApiResponse<()>` body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &e {
            TransferError::InvalidRequest(_) => error_codes::INVALID_PARAMETER,
            TransferError::InsufficientFunds(_) => error_codes::INSUFFICIENT_BALANCE,
            TransferError::Data(_) => error_codes::DATA_ERROR,
            TransferError::ClientNotFound(_) => error_codes::CLIENT_NOT_FOUND,
            TransferError::TransactionNotFound(_) => error_codes::TRANSACTION_NOT_FOUND,
            TransferError::InvalidStateTransition { .. } => error_codes::INVALID_STATE_TRANSITION,
            TransferError::StoreUnavailable(_) | TransferError::QueueUnavailable(_) => {
                error_codes::SERVICE_UNAVAILABLE
            }
            TransferError::QueuePublishFailed { .. } => error_codes::QUEUE_PUBLISH_FAILED,
        };
        if e.is_infrastructure() {
            tracing::error!(error = %e, code = e.code(), "Request failed");
        }
        Self::new(status, code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.msg)),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// 200 with the success envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// 202 with the success envelope
pub fn accepted<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(data))))
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateClientRequest {
    #[schema(example = "Alice")]
    pub name: String,
    #[schema(value_type = String, example = "1000.00")]
    pub balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateClientData {
    pub client_id: ClientId,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceData {
    pub client_id: ClientId,
    #[schema(value_type = String, example = "700.00")]
    pub balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitTransferData {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(example = "failed")]
    pub status: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Transaction status filter
    #[param(example = "pending")]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
}

/// Parse a status from a path or query parameter
pub fn parse_status(raw: &str) -> Result<TransactionStatus, ApiError> {
    raw.parse()
        .map_err(|e: crate::transfer::state::UnknownStatus| ApiError::bad_request(e.to_string()))
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const DATA_ERROR: i32 = 1003;
    pub const INVALID_STATE_TRANSITION: i32 = 1004;

    // Resource errors (4xxx)
    pub const CLIENT_NOT_FOUND: i32 = 4001;
    pub const TRANSACTION_NOT_FOUND: i32 = 4002;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const QUEUE_PUBLISH_FAILED: i32 = 5002;
}
