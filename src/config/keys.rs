//! Enumerated configuration keys
//!
//! Scalar settings that can be addressed by name (environment overrides,
//! diagnostics) go through this table instead of indexing the configuration
//! tree with arbitrary string paths.

use crate::error::GatewayError;
use std::fmt;
use std::str::FromStr;

/// A scalar configuration setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ServerHost,
    ServerPort,
    TransportStdio,
    TransportHttp,
    TransportWebsocket,
    TransportSse,
    AuthEnabled,
    AuthInternalPlan,
    RateLimitDefaultPlan,
    ConcurrencyPerPrincipal,
    ConcurrencyQueueDepth,
    DispatchHandlerTimeoutMs,
    ShutdownDrainTimeoutMs,
    LoggingLevel,
    LoggingFormat,
}

impl ConfigKey {
    /// Every addressable key
    pub const ALL: &'static [ConfigKey] = &[
        ConfigKey::ServerHost,
        ConfigKey::ServerPort,
        ConfigKey::TransportStdio,
        ConfigKey::TransportHttp,
        ConfigKey::TransportWebsocket,
        ConfigKey::TransportSse,
        ConfigKey::AuthEnabled,
        ConfigKey::AuthInternalPlan,
        ConfigKey::RateLimitDefaultPlan,
        ConfigKey::ConcurrencyPerPrincipal,
        ConfigKey::ConcurrencyQueueDepth,
        ConfigKey::DispatchHandlerTimeoutMs,
        ConfigKey::ShutdownDrainTimeoutMs,
        ConfigKey::LoggingLevel,
        ConfigKey::LoggingFormat,
    ];

    /// Dotted path as written in the YAML file
    pub fn path(&self) -> &'static str {
        match self {
            ConfigKey::ServerHost => "server.host",
            ConfigKey::ServerPort => "server.port",
            ConfigKey::TransportStdio => "transports.stdio",
            ConfigKey::TransportHttp => "transports.http",
            ConfigKey::TransportWebsocket => "transports.websocket",
            ConfigKey::TransportSse => "transports.sse",
            ConfigKey::AuthEnabled => "auth.enabled",
            ConfigKey::AuthInternalPlan => "auth.internal_plan",
            ConfigKey::RateLimitDefaultPlan => "rate_limit.default_plan",
            ConfigKey::ConcurrencyPerPrincipal => "concurrency.per_principal",
            ConfigKey::ConcurrencyQueueDepth => "concurrency.queue_depth",
            ConfigKey::DispatchHandlerTimeoutMs => "dispatch.handler_timeout_ms",
            ConfigKey::ShutdownDrainTimeoutMs => "shutdown.drain_timeout_ms",
            ConfigKey::LoggingLevel => "logging.level",
            ConfigKey::LoggingFormat => "logging.format",
        }
    }

    /// Environment variable overriding this key
    pub fn env_var(&self) -> &'static str {
        match self {
            ConfigKey::ServerHost => "TOOLGATE_HOST",
            ConfigKey::ServerPort => "TOOLGATE_PORT",
            ConfigKey::TransportStdio => "TOOLGATE_STDIO",
            ConfigKey::TransportHttp => "TOOLGATE_HTTP",
            ConfigKey::TransportWebsocket => "TOOLGATE_WEBSOCKET",
            ConfigKey::TransportSse => "TOOLGATE_SSE",
            ConfigKey::AuthEnabled => "TOOLGATE_AUTH_ENABLED",
            ConfigKey::AuthInternalPlan => "TOOLGATE_INTERNAL_PLAN",
            ConfigKey::RateLimitDefaultPlan => "TOOLGATE_DEFAULT_PLAN",
            ConfigKey::ConcurrencyPerPrincipal => "TOOLGATE_CONCURRENCY",
            ConfigKey::ConcurrencyQueueDepth => "TOOLGATE_QUEUE_DEPTH",
            ConfigKey::DispatchHandlerTimeoutMs => "TOOLGATE_HANDLER_TIMEOUT_MS",
            ConfigKey::ShutdownDrainTimeoutMs => "TOOLGATE_DRAIN_TIMEOUT_MS",
            ConfigKey::LoggingLevel => "TOOLGATE_LOG_LEVEL",
            ConfigKey::LoggingFormat => "TOOLGATE_LOG_FORMAT",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for ConfigKey {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .iter()
            .copied()
            .find(|key| key.path() == s)
            .ok_or_else(|| GatewayError::config(format!("Unknown configuration key: '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_round_trips_through_from_str() {
        for key in ConfigKey::ALL {
            assert_eq!(key.path().parse::<ConfigKey>().unwrap(), *key);
        }
    }

    #[test]
    fn test_unknown_key() {
        assert!("server.__proto__".parse::<ConfigKey>().is_err());
        assert!("server".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_env_vars_unique() {
        let mut seen = std::collections::HashSet::new();
        for key in ConfigKey::ALL {
            assert!(seen.insert(key.env_var()), "duplicate env var {}", key.env_var());
        }
    }
}
