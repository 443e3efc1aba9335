//! Transport adapters and the JSON-RPC surface they share
//!
//! stdio and WebSocket speak JSON-RPC 2.0; HTTP and SSE use plain JSON
//! envelopes. All of them hand invocations to the one dispatcher.

pub mod broadcaster;
pub mod errors;
pub mod handler;
pub mod http;
pub mod server;
pub mod sse;
pub mod stdio;
pub mod types;
pub mod websocket;

pub use broadcaster::{encode_frame, Broadcaster, StreamTransport, StreamingClient};
pub use errors::{McpError, McpErrorCode};
pub use server::{configure_routes, GatewayState, McpServer};
pub use stdio::{detached_stdin, metadata_from_env, run_stdio};
pub use types::*;
