//! Gateway assembly: shared state and the actix-web server hosting the
//! HTTP, WebSocket and SSE adapters

use crate::auth::Authenticator;
use crate::config::{Config, TransportsConfig};
use crate::error::{GatewayError, Result};
use crate::mcp::broadcaster::Broadcaster;
use crate::mcp::{http, sse, websocket};
use crate::registry::{build_registry, ToolRegistry};
use crate::routing::{ConcurrencyLimiter, Dispatcher};
use crate::security::PlanRateLimiter;
use crate::shutdown::ShutdownCoordinator;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything the adapters share. One instance per process.
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    pub authenticator: Arc<Authenticator>,
    pub sse_keep_alive: Duration,
}

impl GatewayState {
    pub fn new(dispatcher: Arc<Dispatcher>, authenticator: Arc<Authenticator>, sse_keep_alive: Duration) -> Self {
        Self {
            dispatcher,
            authenticator,
            sse_keep_alive,
        }
    }

    /// Build the registry, limiters, dispatcher and authenticator
    pub fn from_config(config: &Config, shutdown: Arc<ShutdownCoordinator>) -> Result<Arc<Self>> {
        let default_timeout = Duration::from_millis(config.dispatch.handler_timeout_ms);
        let registry = build_registry(&config.tools, default_timeout)?;
        registry.log_summary();

        Ok(Arc::new(Self::with_registry(config, registry, shutdown)?))
    }

    /// Same as [`GatewayState::from_config`] with a prebuilt registry
    pub fn with_registry(
        config: &Config,
        registry: ToolRegistry,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::new(PlanRateLimiter::new(&config.rate_limit)),
            ConcurrencyLimiter::new(config.concurrency.per_principal, config.concurrency.queue_depth),
            Arc::new(Broadcaster::new()),
            shutdown,
            Duration::from_millis(config.dispatch.handler_timeout_ms),
        );
        let authenticator = Authenticator::from_config(&config.auth)?;

        Ok(Self::new(
            Arc::new(dispatcher),
            Arc::new(authenticator),
            Duration::from_millis(config.transports.sse_keep_alive_ms),
        ))
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        self.dispatcher.broadcaster()
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        self.dispatcher.shutdown()
    }
}

/// Mount the enabled network adapters
pub fn configure_routes(cfg: &mut web::ServiceConfig, transports: &TransportsConfig) {
    cfg.route("/health", web::get().to(http::health_handler));

    if transports.http {
        cfg.route("/tools", web::get().to(http::list_tools_handler))
            .route("/tools/{name}", web::post().to(http::call_tool_handler));
    }
    if transports.websocket {
        cfg.route("/ws", web::get().to(websocket::websocket_handler));
    }
    if transports.sse {
        cfg.route("/events", web::get().to(sse::sse_handler))
            .route(
                "/events/{client_id}/tools/{name}",
                web::post().to(sse::sse_call_handler),
            );
    }
}

/// HTTP server hosting the network adapters
pub struct McpServer {
    state: Arc<GatewayState>,
    transports: TransportsConfig,
}

impl McpServer {
    pub fn new(state: Arc<GatewayState>, transports: TransportsConfig) -> Self {
        Self { state, transports }
    }

    /// Serve until the shutdown coordinator force-closes connections.
    ///
    /// New connections stop being accepted as soon as shutdown is requested.
    pub async fn run(self, host: &str, port: u16) -> Result<()> {
        let data = web::Data::from(self.state.clone());
        let transports = self.transports.clone();

        let server = HttpServer::new(move || {
            let transports = transports.clone();
            App::new()
                .app_data(data.clone())
                .configure(move |cfg| configure_routes(cfg, &transports))
        })
        .disable_signals()
        .bind((host, port))
        .map_err(|e| GatewayError::transport(format!("Failed to bind {}:{}: {}", host, port, e)))?
        .run();

        info!("Network transports listening on {}:{}", host, port);

        let handle = server.handle();
        let shutdown = self.state.shutdown().clone();
        tokio::spawn(async move {
            shutdown.shutdown_requested().await;
            handle.pause().await;
            shutdown.closed().await;
            handle.stop(false).await;
        });

        server.await.map_err(GatewayError::from)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AuthConfig;

    /// State with the default echo tool; auth disabled means anonymous callers
    pub(crate) fn test_state(auth_enabled: bool) -> GatewayState {
        let config = Config {
            auth: AuthConfig {
                enabled: auth_enabled,
                ..AuthConfig::default()
            },
            ..Config::default()
        };
        let registry = build_registry(&[], Duration::from_secs(1)).unwrap();
        GatewayState::with_registry(&config, registry, ShutdownCoordinator::new()).unwrap()
    }

    #[test]
    fn test_state_shares_one_broadcaster() {
        let state = test_state(false);
        assert!(Arc::ptr_eq(state.broadcaster(), state.dispatcher.broadcaster()));
        assert_eq!(state.dispatcher.registry().len(), 1);
    }
}
