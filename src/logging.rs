//! Process-wide log subscriber
//!
//! Logs always go to stderr so stdout stays reserved for stdio protocol
//! frames. `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingConfig;
use crate::error::{GatewayError, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install the subscriber; later calls are no-ops
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INITIALIZED.get_or_try_init(|| install(config)).map(|_| ())
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| GatewayError::config(format!("Invalid log level '{}': {}", level, e)))
}

fn install(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(&config.level)?);

    let installed = match config.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    installed.map_err(|e| GatewayError::config(format!("Failed to install log subscriber: {}", e)))
}
