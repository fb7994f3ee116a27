//! The request/response seam between this crate and the injected wallet.
//!
//! A wallet is anything that answers EIP-1193 style requests: a method name plus
//! JSON params in, a JSON value (or a coded error) out. The crate never reaches
//! for ambient wallet state; a transport is handed to [`crate::provider::detect`]
//! and flows from there into every component that needs it.

use alloy_primitives::U256;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;

/// EIP-1193 "User Rejected Request".
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193 "Unauthorized".
pub const UNAUTHORIZED: i64 = 4100;

pub trait WalletTransport: Send + Sync {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("wallet returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("wallet transport failed: {0}")]
    Transport(String),
    #[error("malformed wallet response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        TransportError::Rpc {
            code,
            message: message.into(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, TransportError::Rpc { code, .. } if *code == USER_REJECTED_REQUEST)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Rpc { code, .. } if *code == UNAUTHORIZED)
    }
}

pub fn to_quantity(value: U256) -> String {
    format!("{value:#x}")
}

pub fn parse_quantity(value: &Value) -> Result<U256, TransportError> {
    let raw = value
        .as_str()
        .ok_or_else(|| TransportError::Decode(format!("expected hex quantity, got {value}")))?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|err| TransportError::Decode(format!("bad quantity {raw}: {err}")))
}

pub fn parse_u64_quantity(value: &Value) -> Result<u64, TransportError> {
    let quantity = parse_quantity(value)?;
    u64::try_from(quantity)
        .map_err(|_| TransportError::Decode(format!("quantity {quantity} overflows u64")))
}
