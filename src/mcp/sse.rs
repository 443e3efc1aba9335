//! Server-Sent Events: the `/events` stream and its companion call endpoint

use crate::mcp::broadcaster::{encode_frame, Broadcaster, StreamTransport, StreamingClient, CLIENT_BUFFER};
use crate::mcp::http::{authenticate_request, correlation_id, failure_response, parse_arguments, CORRELATION_HEADER};
use crate::mcp::server::GatewayState;
use crate::routing::{FailureKind, InvocationRequest, TransportKind};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::Stream;
use serde_json::json;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

/// Response body of one SSE subscriber.
///
/// Dropping it (client went away, or the server force-closed the stream)
/// cancels the connection token and removes the client from the broadcaster.
struct SseStream {
    rx: mpsc::Receiver<String>,
    client_id: String,
    broadcaster: Arc<Broadcaster>,
    token: CancellationToken,
}

impl Stream for SseStream {
    type Item = Result<web::Bytes, actix_web::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.rx
            .poll_recv(cx)
            .map(|frame| frame.map(|frame| Ok(web::Bytes::from(frame))))
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        self.token.cancel();
        self.broadcaster.deregister(&self.client_id);
        debug!(client_id = %self.client_id, "SSE stream dropped");
    }
}

/// Writes keep-alive comments. A failed write means the stream is gone or
/// the client stopped reading; either way the connection is cancelled.
async fn keep_alive(tx: mpsc::Sender<String>, token: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if tx.try_send(KEEP_ALIVE_FRAME.to_string()).is_err() {
                    debug!("SSE keep-alive write failed");
                    token.cancel();
                    break;
                }
            }
        }
    }
}

pub async fn sse_handler(req: HttpRequest, state: web::Data<GatewayState>) -> HttpResponse {
    let correlation_id = correlation_id(&req);
    let principal = match authenticate_request(&req, &state, &correlation_id).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    if state.shutdown().is_shutdown_requested() {
        return failure_response(FailureKind::Backpressure, "gateway is shutting down", &correlation_id, None);
    }

    let token = state.shutdown().connection_token();
    let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
    let client = StreamingClient::new(StreamTransport::Sse, principal.rate_key(), tx.clone(), token.clone());
    let client_id = client.client_id.clone();

    // Queue the greeting before the client becomes visible to broadcasts
    let _ = tx.try_send(encode_frame(
        StreamTransport::Sse,
        "connected",
        &json!({ "clientId": client_id }),
    ));
    let _ = tx.try_send(encode_frame(
        StreamTransport::Sse,
        "tools",
        &json!({ "tools": state.dispatcher.registry().list() }),
    ));
    state.broadcaster().register(client);

    actix_web::rt::spawn(keep_alive(tx, token.clone(), state.sse_keep_alive));

    info!(client_id = %client_id, principal = %principal.id(), "SSE stream opened");

    let body = SseStream {
        rx,
        client_id,
        broadcaster: state.broadcaster().clone(),
        token,
    };

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body)
}

/// `POST /events/{client_id}/tools/{name}`; the result is pushed as
/// `event: tool_result` on the caller's stream
pub async fn sse_call_handler(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Bytes,
    state: web::Data<GatewayState>,
) -> HttpResponse {
    let correlation_id = correlation_id(&req);
    let principal = match authenticate_request(&req, &state, &correlation_id).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let (client_id, tool_name) = path.into_inner();
    let client = match state.broadcaster().get(&client_id) {
        Some(client) if client.transport == StreamTransport::Sse => client,
        _ => {
            return failure_response(
                FailureKind::NotFound,
                &format!("streaming client '{}' not found", client_id),
                &correlation_id,
                None,
            )
        }
    };
    if client.principal_id != principal.rate_key() {
        return failure_response(
            FailureKind::Forbidden,
            "stream belongs to another principal",
            &correlation_id,
            None,
        );
    }

    let arguments = match parse_arguments(&body) {
        Ok(arguments) => arguments,
        Err(message) => {
            return failure_response(FailureKind::InvalidArguments, &message, &correlation_id, None)
        }
    };

    let request = InvocationRequest::new(
        tool_name,
        arguments,
        principal,
        TransportKind::Sse,
        correlation_id.clone(),
        client.cancellation.child_token(),
    )
    .with_origin_client(client_id);

    let dispatcher = state.dispatcher.clone();
    actix_web::rt::spawn(async move {
        dispatcher.invoke(request).await;
    });

    HttpResponse::Accepted()
        .insert_header((CORRELATION_HEADER, correlation_id.as_str()))
        .json(json!({ "accepted": true, "correlationId": correlation_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_stream_drop_deregisters_and_cancels() {
        let broadcaster = Arc::new(Broadcaster::new());
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let client = StreamingClient::new(StreamTransport::Sse, "acme:alice", tx, token.clone());
        let client_id = client.client_id.clone();
        broadcaster.register(client);

        let stream = SseStream {
            rx,
            client_id: client_id.clone(),
            broadcaster: broadcaster.clone(),
            token: token.clone(),
        };
        drop(stream);

        assert!(token.is_cancelled());
        assert!(!broadcaster.contains(&client_id));
    }

    #[tokio::test]
    async fn test_stream_yields_queued_frames() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let mut stream = SseStream {
            rx,
            client_id: "c".to_string(),
            broadcaster,
            token: CancellationToken::new(),
        };

        tx.try_send("event: tools\ndata: {}\n\n".to_string()).unwrap();
        drop(tx);

        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"event: tools\ndata: {}\n\n");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_keep_alive_stops_on_cancel() {
        let (tx, mut rx) = mpsc::channel(CLIENT_BUFFER);
        let token = CancellationToken::new();
        let task = tokio::spawn(keep_alive(tx, token.clone(), Duration::from_millis(20)));

        assert_eq!(rx.recv().await.as_deref(), Some(KEEP_ALIVE_FRAME));

        token.cancel();
        task.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_keep_alive_cancels_stalled_reader() {
        let (tx, _rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let task = tokio::spawn(keep_alive(tx, token.clone(), Duration::from_millis(10)));

        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(token.is_cancelled());
    }
}
