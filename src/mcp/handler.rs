//! JSON-RPC method handling shared by the stdio and WebSocket adapters

use crate::auth::{Principal, RequestMetadata};
use crate::mcp::errors::McpError;
use crate::mcp::server::GatewayState;
use crate::mcp::types::{
    correlation_from_id, JsonRpcRequest, JsonRpcResponse, ToolCallParams, JSONRPC_VERSION, PROTOCOL_VERSION,
};
use crate::routing::{FailureKind, InvocationRequest, InvocationResult, TransportKind};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decode one frame, run it, and encode the reply.
///
/// Returns `None` for notifications. Malformed frames produce a JSON-RPC
/// error reply and never affect the connection.
pub async fn handle_frame(
    state: &GatewayState,
    text: &str,
    metadata: &RequestMetadata,
    transport: TransportKind,
    cancellation: &CancellationToken,
) -> Option<JsonRpcResponse> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Unparseable {} frame: {}", transport, e);
            return Some(JsonRpcResponse::error(
                Value::Null,
                McpError::parse_error(format!("Parse error: {}", e)),
            ));
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Some(JsonRpcResponse::error(
                id,
                McpError::invalid_request(format!("Invalid request: {}", e)),
            ))
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Some(JsonRpcResponse::error(
            id,
            McpError::invalid_request("jsonrpc must be \"2.0\""),
        ));
    }

    if request.is_notification() {
        debug!("Ignoring notification '{}'", request.method);
        return None;
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    Some(handle_request(state, id, request, metadata, transport, cancellation).await)
}

async fn handle_request(
    state: &GatewayState,
    id: Value,
    request: JsonRpcRequest,
    metadata: &RequestMetadata,
    transport: TransportKind,
    cancellation: &CancellationToken,
) -> JsonRpcResponse {
    let correlation_id = correlation_from_id(&id);

    match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": "toolgate", "version": crate::VERSION },
                "capabilities": { "tools": { "listChanged": false } }
            }),
        ),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => match authenticate(state, metadata, &correlation_id).await {
            Ok(_) => JsonRpcResponse::success(id, json!({ "tools": state.dispatcher.registry().list() })),
            Err(error) => JsonRpcResponse::error(id, error),
        },
        "tools/call" => {
            let principal = match authenticate(state, metadata, &correlation_id).await {
                Ok(principal) => principal,
                Err(error) => return JsonRpcResponse::error(id, error),
            };

            let params: ToolCallParams = match request.params.map(serde_json::from_value) {
                Some(Ok(params)) => params,
                Some(Err(e)) => {
                    return JsonRpcResponse::error(
                        id,
                        McpError::from_failure(
                            FailureKind::InvalidArguments,
                            format!("Invalid tools/call params: {}", e),
                            &correlation_id,
                            None,
                        ),
                    )
                }
                None => {
                    return JsonRpcResponse::error(
                        id,
                        McpError::from_failure(
                            FailureKind::InvalidArguments,
                            "tools/call requires params",
                            &correlation_id,
                            None,
                        ),
                    )
                }
            };

            let invocation = InvocationRequest::new(
                params.name,
                params.arguments.unwrap_or_else(|| json!({})),
                principal,
                transport,
                correlation_id.clone(),
                cancellation.clone(),
            );

            match state.dispatcher.invoke(invocation).await {
                InvocationResult::Success { data } => JsonRpcResponse::success(id, data),
                InvocationResult::Failure {
                    kind,
                    message,
                    retry_after_ms,
                } => JsonRpcResponse::error(
                    id,
                    McpError::from_failure(kind, message, &correlation_id, retry_after_ms),
                ),
            }
        }
        other => JsonRpcResponse::error(id, McpError::method_not_found(other)),
    }
}

async fn authenticate(
    state: &GatewayState,
    metadata: &RequestMetadata,
    correlation_id: &str,
) -> Result<Principal, McpError> {
    state.authenticator.authenticate(metadata).await.map_err(|failure| {
        warn!(correlation_id = %correlation_id, "Rejected unauthenticated request");
        McpError::from_failure(FailureKind::Unauthorized, failure.public_message(), correlation_id, None)
    })
}
