//! Toolgate - a tool-invocation gateway
//!
//! One tool registry served over stdio, HTTP, WebSocket and Server-Sent
//! Events. Every transport resolves the caller to a principal, then hands the
//! call to a single dispatcher that validates arguments, checks capabilities,
//! applies per-plan rate limits and per-principal concurrency limits, and runs
//! the handler with a timeout.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod registry;
pub mod routing;
pub mod security;
pub mod shutdown;

pub use config::Config;
pub use error::{GatewayError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Default server host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_PORT: u16 = 3001;
