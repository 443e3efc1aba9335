//! Error handling module for the gateway

mod error;

// Re-export the main error types and utilities
pub use error::{GatewayError, Result};
