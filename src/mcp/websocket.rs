//! JSON-RPC over WebSocket at `/ws`
//!
//! The upgrade is authenticated once; every frame is then re-authenticated
//! with the handshake headers. Frames run on their own tasks so a slow tool
//! never blocks the read loop, and replies are matched to requests by id.

use crate::auth::RequestMetadata;
use crate::mcp::broadcaster::{StreamTransport, StreamingClient, CLIENT_BUFFER};
use crate::mcp::errors::McpError;
use crate::mcp::handler::handle_frame;
use crate::mcp::http::{authenticate_request, correlation_id, failure_response};
use crate::mcp::server::GatewayState;
use crate::mcp::types::JsonRpcResponse;
use crate::routing::{FailureKind, TransportKind};
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<GatewayState>,
) -> actix_web::Result<HttpResponse> {
    let correlation_id = correlation_id(&req);
    let principal = match authenticate_request(&req, &state, &correlation_id).await {
        Ok(principal) => principal,
        Err(response) => return Ok(response),
    };
    if state.shutdown().is_shutdown_requested() {
        return Ok(failure_response(
            FailureKind::Backpressure,
            "gateway is shutting down",
            &correlation_id,
            None,
        ));
    }

    let (response, session, messages) = actix_ws::handle(&req, stream)?;

    let metadata = Arc::new(RequestMetadata::from_http_request(&req));
    let token = state.shutdown().connection_token();
    let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
    let client = StreamingClient::new(
        StreamTransport::WebSocket,
        principal.rate_key(),
        tx.clone(),
        token.clone(),
    );
    let client_id = client.client_id.clone();
    state.broadcaster().register(client);

    info!(client_id = %client_id, principal = %principal.id(), "WebSocket session started");

    actix_web::rt::spawn(write_loop(session.clone(), rx, token.clone()));
    actix_web::rt::spawn(read_loop(
        state.into_inner(),
        session,
        messages,
        metadata,
        tx,
        token,
        client_id,
    ));

    Ok(response)
}

/// Single writer for the socket; replies and broadcasts both land here
async fn write_loop(mut session: Session, mut rx: mpsc::Receiver<String>, token: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if session.text(frame).await.is_err() {
                        token.cancel();
                        break;
                    }
                }
                None => break,
            },
            _ = token.cancelled() => break,
        }
    }
    let _ = session.close(None).await;
}

async fn read_loop(
    state: Arc<GatewayState>,
    mut session: Session,
    mut messages: MessageStream,
    metadata: Arc<RequestMetadata>,
    tx: mpsc::Sender<String>,
    token: CancellationToken,
    client_id: String,
) {
    loop {
        let message = tokio::select! {
            _ = token.cancelled() => break,
            message = messages.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                let state = state.clone();
                let metadata = metadata.clone();
                let tx = tx.clone();
                let token = token.clone();
                actix_web::rt::spawn(async move {
                    let reply = handle_frame(&state, &text, &metadata, TransportKind::WebSocket, &token).await;
                    if let Some(reply) = reply {
                        send_reply(&tx, &reply, &token).await;
                    }
                });
            }
            Some(Ok(Message::Binary(_))) => {
                let reply = JsonRpcResponse::error(
                    Value::Null,
                    McpError::invalid_request("binary frames are not supported"),
                );
                actix_web::rt::spawn({
                    let tx = tx.clone();
                    let token = token.clone();
                    async move { send_reply(&tx, &reply, &token).await }
                });
            }
            Some(Ok(Message::Ping(bytes))) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(reason))) => {
                debug!(client_id = %client_id, "WebSocket closed by client: {:?}", reason);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(client_id = %client_id, "WebSocket protocol error: {}", e);
                break;
            }
            None => break,
        }
    }

    // In-flight invocations on this socket observe the cancellation
    token.cancel();
    state.broadcaster().deregister(&client_id);
    info!(client_id = %client_id, "WebSocket session ended");
}

/// Replies wait for buffer space; broadcasts do not
async fn send_reply(tx: &mpsc::Sender<String>, reply: &JsonRpcResponse, token: &CancellationToken) {
    let frame = match serde_json::to_string(reply) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to encode WebSocket reply: {}", e);
            return;
        }
    };
    tokio::select! {
        _ = token.cancelled() => {}
        // The socket may already be gone
        _ = tx.send(frame) => {}
    }
}
