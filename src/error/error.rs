//! Error types and handling for the gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for gateway infrastructure.
///
/// Client-visible invocation failures are not represented here; they travel
/// as [`crate::routing::InvocationResult`] values. This type covers startup,
/// configuration and plumbing failures.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Registry errors
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// Credential store errors
    #[error("Credential store error: {message}")]
    Store { message: String },

    /// Transport errors (bind failures, broken sinks)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry<S: Into<String>>(message: S) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Create a credential store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Config { .. } => "config",
            GatewayError::Registry { .. } => "registry",
            GatewayError::Store { .. } => "store",
            GatewayError::Transport { .. } => "transport",
            GatewayError::Io(_) => "io",
            GatewayError::Serde(_) => "serialization",
            GatewayError::Yaml(_) => "yaml",
            GatewayError::Http(_) => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(GatewayError::config("x").category(), "config");
        assert_eq!(GatewayError::registry("x").category(), "registry");
        assert_eq!(GatewayError::transport("x").category(), "transport");
        let io = GatewayError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.category(), "io");
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::registry("duplicate tool 'echo'");
        assert_eq!(err.to_string(), "Registry error: duplicate tool 'echo'");
    }
}
