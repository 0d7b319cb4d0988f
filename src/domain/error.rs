//! Engine error taxonomy and the command response envelope.
//!
//! Failures inside a loop tick or an extraction/equalization phase are caught
//! locally and recorded in result vectors; only operation-level preconditions
//! (unknown token, already-active loop, insufficient reserve) surface as
//! `EngineError`.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range numeric parameters
    #[error("invalid parameter: {0}")]
    Validation(String),

    /// Unknown token, account or liquidity venue
    #[error("not found: {0}")]
    NotFound(String),

    /// Cached balance below the requested amount or reserve
    #[error("insufficient funds: have {have:.4}, need {need:.4}")]
    InsufficientFunds { have: f64, need: f64 },

    /// Ledger or price-feed call failed
    #[error("external call failed: {0}")]
    ExternalCall(String),

    /// Duplicate start of an already-active loop or monitor
    #[error("already active: {0}")]
    ConcurrencyConflict(String),
}

/// Structured result returned by every command-surface operation.
///
/// Stopping an already-inactive loop or cancelling an inactive monitor is
/// reported through this envelope (`success: false`) rather than as an error.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn from_result(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = EngineError::InsufficientFunds {
            have: 1.0,
            need: 2.5,
        };
        assert_eq!(e.to_string(), "insufficient funds: have 1.0000, need 2.5000");

        let e = EngineError::ConcurrencyConflict("trading loop for MEME".to_string());
        assert!(e.to_string().contains("already active"));
    }

    #[test]
    fn test_command_response_ok() {
        let resp = CommandResponse::ok(42u32);
        assert!(resp.success);
        assert_eq!(resp.data, Some(42));
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_command_response_failed() {
        let resp: CommandResponse<u32> = CommandResponse::failed("trading is not active");
        assert!(!resp.success);
        assert!(resp.data.is_none());
        assert_eq!(resp.error.as_deref(), Some("trading is not active"));
    }

    #[test]
    fn test_command_response_serializes_without_nulls() {
        let resp = CommandResponse::ok("done");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("error"));
    }
}
