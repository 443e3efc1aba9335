//! JSON-RPC error codes and error objects for the framed transports

use crate::routing::FailureKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Error codes following JSON-RPC 2.0, plus gateway codes below -32000
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorCode {
    // Standard JSON-RPC error codes
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // Gateway codes
    ToolNotFound = -32000,
    ToolExecutionFailed = -31999,
    AuthenticationFailed = -31994,
    AuthorizationFailed = -31993,
    RateLimitExceeded = -31990,
    ServiceUnavailable = -31989,
    TimeoutError = -31988,
}

impl McpErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::InvalidArguments => McpErrorCode::InvalidParams,
            FailureKind::Unauthorized => McpErrorCode::AuthenticationFailed,
            FailureKind::Forbidden => McpErrorCode::AuthorizationFailed,
            FailureKind::NotFound => McpErrorCode::ToolNotFound,
            FailureKind::RateLimited => McpErrorCode::RateLimitExceeded,
            FailureKind::Backpressure => McpErrorCode::ServiceUnavailable,
            FailureKind::Timeout => McpErrorCode::TimeoutError,
            FailureKind::HandlerError => McpErrorCode::ToolExecutionFailed,
            FailureKind::InternalError => McpErrorCode::InternalError,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: McpErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: McpErrorCode::MethodNotFound.code(),
            message: format!("Method '{}' not found", method),
            data: Some(json!({ "method": method })),
        }
    }

    /// Error object for a taxonomy failure
    pub fn from_failure(
        kind: FailureKind,
        message: impl Into<String>,
        correlation_id: &str,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let mut data = json!({
            "kind": kind.as_str(),
            "correlationId": correlation_id,
        });
        if let Some(retry_after_ms) = retry_after_ms {
            data["retryAfterMs"] = json!(retry_after_ms);
        }
        Self {
            code: McpErrorCode::from_failure(kind).code(),
            message: message.into(),
            data: Some(data),
        }
    }
}
