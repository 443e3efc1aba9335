//! Tool registry: definitions, compiled schemas and built-in handlers

pub mod builtin;
pub mod service;
pub mod types;

pub use builtin::{build_registry, default_echo_tool, BackendHandler, EchoHandler};
pub use service::ToolRegistry;
pub use types::*;
