//! Transfer request types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core_types::ClientId;

use super::error::TransferError;

/// Currency amounts carry at most this many fractional digits (cents)
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// Validated-on-submit transfer request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    #[schema(example = 1)]
    pub from_client_id: ClientId,
    #[schema(example = 2)]
    pub to_client_id: ClientId,
    #[schema(value_type = String, example = "300.00")]
    pub amount: Decimal,
}

impl TransferRequest {
    pub fn new(from_client_id: ClientId, to_client_id: ClientId, amount: Decimal) -> Self {
        Self {
            from_client_id,
            to_client_id,
            amount,
        }
    }

    /// Reject self-transfers, non-positive amounts and sub-cent precision.
    ///
    /// Client existence is checked by the store, not here.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.from_client_id <= 0 || self.to_client_id <= 0 {
            return Err(TransferError::InvalidRequest(
                "client ids must be positive".to_string(),
            ));
        }
        if self.from_client_id == self.to_client_id {
            return Err(TransferError::InvalidRequest(
                "sender and receiver must differ".to_string(),
            ));
        }
        validate_amount(self.amount, false)
    }
}

/// Integer digits a `NUMERIC(20,2)` column holds
pub const MAX_AMOUNT_DIGITS: u32 = 18;

/// Exclusive upper bound for any stored amount or balance
pub fn amount_limit() -> Decimal {
    Decimal::from(10i64.pow(MAX_AMOUNT_DIGITS))
}

/// Shared amount check for transfers (`allow_zero = false`) and opening balances
pub fn validate_amount(amount: Decimal, allow_zero: bool) -> Result<(), TransferError> {
    if amount.is_sign_negative() || (!allow_zero && amount.is_zero()) {
        return Err(TransferError::InvalidRequest(if allow_zero {
            "amount must not be negative".to_string()
        } else {
            "amount must be greater than zero".to_string()
        }));
    }
    if amount >= amount_limit() {
        return Err(TransferError::InvalidRequest(format!(
            "amount must be below 10^{}",
            MAX_AMOUNT_DIGITS
        )));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(TransferError::InvalidRequest(format!(
            "amount precision exceeds {} decimal places",
            MAX_AMOUNT_SCALE
        )));
    }
    Ok(())
}
