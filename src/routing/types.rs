//! Invocation request/result types shared by every transport

use crate::auth::Principal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Transport a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
    WebSocket,
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::WebSocket => "websocket",
            TransportKind::Sse => "sse",
        };
        f.write_str(name)
    }
}

/// Client-visible failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    InvalidArguments,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    Backpressure,
    Timeout,
    HandlerError,
    InternalError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidArguments => "InvalidArguments",
            FailureKind::Unauthorized => "Unauthorized",
            FailureKind::Forbidden => "Forbidden",
            FailureKind::NotFound => "NotFound",
            FailureKind::RateLimited => "RateLimited",
            FailureKind::Backpressure => "Backpressure",
            FailureKind::Timeout => "Timeout",
            FailureKind::HandlerError => "HandlerError",
            FailureKind::InternalError => "InternalError",
        }
    }

    /// HTTP status used by the request/response transport
    pub fn http_status(&self) -> u16 {
        match self {
            FailureKind::InvalidArguments => 400,
            FailureKind::Unauthorized => 401,
            FailureKind::Forbidden => 403,
            FailureKind::NotFound => 404,
            FailureKind::RateLimited => 429,
            FailureKind::Backpressure => 503,
            FailureKind::Timeout => 504,
            FailureKind::HandlerError => 502,
            FailureKind::InternalError => 500,
        }
    }

    /// JSON-RPC error code used by the framed transports
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            FailureKind::InvalidArguments => -32602,
            FailureKind::InternalError => -32603,
            FailureKind::NotFound => -32000,
            FailureKind::HandlerError => -31999,
            FailureKind::Unauthorized => -31994,
            FailureKind::Forbidden => -31993,
            FailureKind::RateLimited => -31990,
            FailureKind::Backpressure => -31989,
            FailureKind::Timeout => -31988,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool invocation, transport-neutral
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub tool_name: String,
    pub arguments: Value,
    pub principal: Principal,
    pub transport: TransportKind,
    pub correlation_id: String,
    /// SSE subscriber the result is pushed to
    pub origin_client: Option<String>,
    /// Owned by the originating connection
    pub cancellation: CancellationToken,
}

impl InvocationRequest {
    pub fn new(
        tool_name: impl Into<String>,
        arguments: Value,
        principal: Principal,
        transport: TransportKind,
        correlation_id: impl Into<String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            principal,
            transport,
            correlation_id: correlation_id.into(),
            origin_client: None,
            cancellation,
        }
    }

    pub fn with_origin_client(mut self, client_id: impl Into<String>) -> Self {
        self.origin_client = Some(client_id.into());
        self
    }
}

/// Outcome of an invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationResult {
    Success {
        data: Value,
    },
    Failure {
        kind: FailureKind,
        message: String,
        #[serde(rename = "retryAfterMs", skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
}

impl InvocationResult {
    pub fn success(data: Value) -> Self {
        InvocationResult::Success { data }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        InvocationResult::Failure {
            kind,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn rate_limited(retry_after_ms: u64) -> Self {
        InvocationResult::Failure {
            kind: FailureKind::RateLimited,
            message: "rate limit exceeded".to_string(),
            retry_after_ms: Some(retry_after_ms),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            InvocationResult::Success { .. } => None,
            InvocationResult::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Generate a correlation id for requests that did not bring one
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
