//! Streaming broadcaster
//!
//! Registry of the currently connected push clients (WebSocket and SSE).
//! Each client owns a bounded outbound channel drained by its connection
//! task. A write that fails, either because the connection is gone or because
//! the client stopped reading and its buffer is full, removes the client and
//! fires its cancellation token on the spot.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Frames a client may have queued before a write counts as failed
pub const CLIENT_BUFFER: usize = 256;

/// Push transport of a streaming client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTransport {
    WebSocket,
    Sse,
}

/// A connected push client
#[derive(Debug, Clone)]
pub struct StreamingClient {
    pub client_id: String,
    pub transport: StreamTransport,
    /// `Principal::rate_key` of the authenticated subscriber
    pub principal_id: String,
    pub sink: mpsc::Sender<String>,
    pub cancellation: CancellationToken,
}

impl StreamingClient {
    pub fn new(
        transport: StreamTransport,
        principal_id: impl Into<String>,
        sink: mpsc::Sender<String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            transport,
            principal_id: principal_id.into(),
            sink,
            cancellation,
        }
    }

    fn write(&self, frame: String) -> bool {
        match self.sink.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(client_id = %self.client_id, "Outbound buffer full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Frame an event for a transport
pub fn encode_frame(transport: StreamTransport, event: &str, payload: &Value) -> String {
    match transport {
        StreamTransport::WebSocket => json!({
            "jsonrpc": "2.0",
            "method": format!("notifications/{}", event),
            "params": payload,
        })
        .to_string(),
        StreamTransport::Sse => format!("event: {}\ndata: {}\n\n", event, payload),
    }
}

#[derive(Debug, Default)]
pub struct Broadcaster {
    clients: DashMap<String, StreamingClient>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: StreamingClient) {
        info!(
            client_id = %client.client_id,
            transport = ?client.transport,
            "Streaming client registered"
        );
        self.clients.insert(client.client_id.clone(), client);
    }

    /// Remove a client; returns it if it was registered
    pub fn deregister(&self, client_id: &str) -> Option<StreamingClient> {
        let removed = self.clients.remove(client_id).map(|(_, client)| client);
        if removed.is_some() {
            info!(client_id = %client_id, "Streaming client deregistered");
        }
        removed
    }

    pub fn get(&self, client_id: &str) -> Option<StreamingClient> {
        self.clients.get(client_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    fn drop_dead(&self, client_id: &str) {
        if let Some(client) = self.deregister(client_id) {
            debug!(client_id = %client_id, "Write failed; dropping streaming client");
            client.cancellation.cancel();
        }
    }

    /// Write an event to every client; returns how many writes succeeded
    pub fn broadcast<T: Serialize>(&self, event: &str, payload: &T) -> usize {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Failed to serialize broadcast payload: {}", e);
                return 0;
            }
        };

        // Collect first; removing while iterating would deadlock the shard
        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            let client = entry.value();
            if client.write(encode_frame(client.transport, event, &payload)) {
                delivered += 1;
            } else {
                dead.push(client.client_id.clone());
            }
        }

        for client_id in dead {
            self.drop_dead(&client_id);
        }
        debug!("Broadcast '{}' delivered to {} clients", event, delivered);
        delivered
    }

    /// Write an event to one client; false if it is unknown or gone
    pub fn send_to<T: Serialize>(&self, client_id: &str, event: &str, payload: &T) -> bool {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Failed to serialize event payload: {}", e);
                return false;
            }
        };

        let written = match self.clients.get(client_id) {
            Some(client) => client.write(encode_frame(client.transport, event, &payload)),
            None => return false,
        };
        if !written {
            self.drop_dead(client_id);
        }
        written
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Remove every client and cancel its connection
    pub fn clear(&self) {
        let ids: Vec<String> = self.clients.iter().map(|entry| entry.key().clone()).collect();
        for client_id in ids {
            if let Some(client) = self.deregister(&client_id) {
                client.cancellation.cancel();
            }
        }
    }
}
