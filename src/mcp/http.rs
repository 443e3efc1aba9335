//! Request/response HTTP adapter: `GET /tools`, `POST /tools/{name}`,
//! `GET /health`

use crate::auth::{Principal, RequestMetadata};
use crate::mcp::server::GatewayState;
use crate::routing::{new_correlation_id, FailureKind, InvocationRequest, InvocationResult, TransportKind};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::{json, Value};
use tracing::debug;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Caller-supplied correlation id, or a fresh one
pub fn correlation_id(req: &HttpRequest) -> String {
    req.headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_correlation_id)
}

/// Error envelope `{success:false, error:{kind, message, correlationId, retryAfterMs?}}`
pub fn failure_response(
    kind: FailureKind,
    message: &str,
    correlation_id: &str,
    retry_after_ms: Option<u64>,
) -> HttpResponse {
    let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut error = json!({
        "kind": kind.as_str(),
        "message": message,
        "correlationId": correlation_id,
    });

    let mut builder = HttpResponse::build(status);
    builder.insert_header((CORRELATION_HEADER, correlation_id));
    if let Some(retry_after_ms) = retry_after_ms {
        error["retryAfterMs"] = json!(retry_after_ms);
        builder.insert_header(("Retry-After", retry_after_ms.div_ceil(1000).max(1).to_string()));
    }

    builder.json(json!({ "success": false, "error": error }))
}

/// Map an invocation result onto the HTTP envelope
pub fn result_response(result: InvocationResult, correlation_id: &str) -> HttpResponse {
    match result {
        InvocationResult::Success { data } => HttpResponse::Ok()
            .insert_header((CORRELATION_HEADER, correlation_id))
            .json(json!({ "success": true, "result": data })),
        InvocationResult::Failure {
            kind,
            message,
            retry_after_ms,
        } => failure_response(kind, &message, correlation_id, retry_after_ms),
    }
}

/// Authenticate or produce the 401 envelope
pub async fn authenticate_request(
    req: &HttpRequest,
    state: &GatewayState,
    correlation_id: &str,
) -> Result<Principal, HttpResponse> {
    let metadata = RequestMetadata::from_http_request(req);
    state
        .authenticator
        .authenticate(&metadata)
        .await
        .map_err(|failure| failure_response(FailureKind::Unauthorized, failure.public_message(), correlation_id, None))
}

/// Liveness payload; 503 while draining so balancers stop routing here
pub async fn health_handler(state: web::Data<GatewayState>) -> HttpResponse {
    let draining = state.shutdown().is_draining();
    let body = json!({
        "status": if draining { "draining" } else { "ok" },
        "version": crate::VERSION,
        "tools": state.dispatcher.registry().len(),
        "streamingClients": state.broadcaster().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    if draining {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

pub async fn list_tools_handler(req: HttpRequest, state: web::Data<GatewayState>) -> HttpResponse {
    let correlation_id = correlation_id(&req);
    if let Err(response) = authenticate_request(&req, &state, &correlation_id).await {
        return response;
    }

    HttpResponse::Ok()
        .insert_header((CORRELATION_HEADER, correlation_id.as_str()))
        .json(json!({ "tools": state.dispatcher.registry().list() }))
}

/// Parse a request body as tool arguments; empty means `{}`
pub fn parse_arguments(body: &[u8]) -> Result<Value, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|e| format!("request body is not valid JSON: {}", e))
}

pub async fn call_tool_handler(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    state: web::Data<GatewayState>,
) -> HttpResponse {
    let correlation_id = correlation_id(&req);
    let principal = match authenticate_request(&req, &state, &correlation_id).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let arguments = match parse_arguments(&body) {
        Ok(arguments) => arguments,
        Err(message) => {
            return failure_response(FailureKind::InvalidArguments, &message, &correlation_id, None)
        }
    };

    // A client disconnect drops this future, and with it the guard
    let token = state.shutdown().connection_token();
    let guard = token.clone().drop_guard();

    let request = InvocationRequest::new(
        path.into_inner(),
        arguments,
        principal,
        TransportKind::Http,
        correlation_id.clone(),
        token,
    );
    let result = state.dispatcher.invoke(request).await;
    guard.disarm();

    debug!(correlation_id = %correlation_id, "HTTP tool call finished");
    result_response(result, &correlation_id)
}
