//! Configuration module for the gateway
//!
//! This module provides configuration management and loading utilities.

mod config;
pub mod keys;

// Re-export the main configuration types
pub use config::{
    AuthConfig, ConcurrencyConfig, Config, CredentialHeaders, CredentialStoreConfig,
    DispatchConfig, HandlerConfig, JwtConfig, LoggingConfig, PlanLimit, RateLimitConfig,
    ServerConfig, ShutdownConfig, ToolConfig, TransportsConfig, VendorAuthorityConfig,
};
pub use keys::ConfigKey;
