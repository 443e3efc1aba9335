//! SSE adapter: `/events` stream and the companion call endpoint

mod common;

use common::*;
use sse_reader::EventReader;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Minimal SSE reader over an awc response body
mod sse_reader {
    use futures_util::{Stream, StreamExt};
    use serde_json::Value;
    use std::pin::Pin;
    use std::time::Duration;

    pub struct EventReader<S> {
        body: Pin<Box<S>>,
        buffer: String,
    }

    impl<S, E> EventReader<S>
    where
        S: Stream<Item = Result<actix_web::web::Bytes, E>>,
        E: std::fmt::Debug,
    {
        pub fn new(body: S) -> Self {
            Self {
                body: Box::pin(body),
                buffer: String::new(),
            }
        }

        /// Next `(event, data)` pair, skipping keep-alive comments
        pub async fn next_event(&mut self) -> (String, Value) {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let block: String = self.buffer.drain(..end + 2).collect();
                    let mut event = None;
                    let mut data = None;
                    for line in block.lines() {
                        if let Some(name) = line.strip_prefix("event: ") {
                            event = Some(name.to_string());
                        } else if let Some(payload) = line.strip_prefix("data: ") {
                            data = Some(serde_json::from_str(payload).unwrap());
                        }
                    }
                    if let (Some(event), Some(data)) = (event, data) {
                        return (event, data);
                    }
                    continue;
                }

                let chunk = tokio::time::timeout(Duration::from_secs(5), self.body.next())
                    .await
                    .expect("timed out waiting for an SSE event")
                    .expect("SSE stream ended")
                    .unwrap();
                self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        }
    }
}

#[actix_rt::test]
async fn test_stream_requires_credentials() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with(Arc::default())));

    let response = srv.get("/events").send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[actix_rt::test]
async fn test_connected_tools_then_tool_result() {
    let state = state_with(&gateway_config(), registry_with(Arc::default()));
    let srv = start_gateway(state.clone());

    let response = srv
        .get("/events")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.headers().get("content-type").unwrap(), "text/event-stream");

    let mut events = EventReader::new(response);
    let (event, connected) = events.next_event().await;
    assert_eq!(event, "connected");
    let client_id = connected["clientId"].as_str().unwrap().to_string();

    let (event, tools) = events.next_event().await;
    assert_eq!(event, "tools");
    assert_eq!(tools["tools"][0]["name"], "echo");

    let mut accepted = srv
        .post(format!("/events/{}/tools/echo", client_id))
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send_json(&json!({ "message": "pushed" }))
        .await
        .unwrap();
    assert_eq!(accepted.status().as_u16(), 202);
    let accepted: Value = accepted.json().await.unwrap();
    assert_eq!(accepted["accepted"], true);

    let (event, result) = events.next_event().await;
    assert_eq!(event, "tool_result");
    assert_eq!(result["correlationId"], accepted["correlationId"]);
    assert_eq!(result["tool"], "echo");
    assert_eq!(
        result["result"],
        json!({ "status": "success", "data": { "message": "pushed" } })
    );
}

#[actix_rt::test]
async fn test_companion_call_checks_stream_owner() {
    let srv = start_gateway(state_with(&gateway_config(), registry_with(Arc::default())));

    let response = srv
        .get("/events")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send()
        .await
        .unwrap();
    let mut events = EventReader::new(response);
    let (_, connected) = events.next_event().await;
    let client_id = connected["clientId"].as_str().unwrap().to_string();

    let response = srv
        .post(format!("/events/{}/tools/echo", client_id))
        .insert_header(("x-api-key", VIEWER_API_KEY))
        .send_json(&json!({ "message": "not yours" }))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = srv
        .post("/events/no-such-client/tools/echo")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send_json(&json!({ "message": "nobody" }))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[actix_rt::test]
async fn test_dropped_stream_is_deregistered() {
    let mut config = gateway_config();
    config.transports.sse_keep_alive_ms = 50;
    let state = state_with(&config, registry_with(Arc::default()));
    let srv = start_gateway(state.clone());

    let response = srv
        .get("/events")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send()
        .await
        .unwrap();
    let mut events = EventReader::new(response);
    events.next_event().await;
    assert_eq!(state.broadcaster().len(), 1);

    drop(events);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(eventually(|| state.broadcaster().is_empty()).await);
}

#[actix_rt::test]
async fn test_closing_stream_cancels_companion_call() {
    let mut config = gateway_config();
    config.transports.sse_keep_alive_ms = 50;
    let parked = Arc::new(ParkedHandler::default());
    let state = state_with(&config, registry_with(parked.clone()));
    let srv = start_gateway(state.clone());

    let response = srv
        .get("/events")
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send()
        .await
        .unwrap();
    let mut events = EventReader::new(response);
    let (_, connected) = events.next_event().await;
    let client_id = connected["clientId"].as_str().unwrap().to_string();

    let accepted = srv
        .post(format!("/events/{}/tools/park", client_id))
        .insert_header(("x-internal-key", INTERNAL_SECRET))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status().as_u16(), 202);
    tokio::time::timeout(Duration::from_secs(5), parked.started.notified())
        .await
        .unwrap();

    drop(events);

    assert!(eventually(|| parked.cancelled.load(Ordering::SeqCst)).await);
    assert!(eventually(|| state.broadcaster().is_empty()).await);
    assert!(eventually(|| state.shutdown().in_flight() == 0).await);
}
