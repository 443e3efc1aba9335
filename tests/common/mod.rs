//! Shared fixtures for the transport integration tests

#![allow(dead_code)]

use actix_test::{start, TestServer};
use actix_web::{web, App};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use toolgate::auth::store::{ApiKeyRecord, InternalKeyRecord, KeyStatus, ServiceRecord};
use toolgate::auth::{digest_secret, Principal, Role};
use toolgate::config::{AuthConfig, CredentialStoreConfig, PlanLimit, RateLimitConfig, TransportsConfig};
use toolgate::mcp::{configure_routes, GatewayState};
use toolgate::registry::{default_echo_tool, ToolContext, ToolDefinition, ToolError, ToolHandler, ToolRegistry};
use toolgate::shutdown::ShutdownCoordinator;
use toolgate::Config;

pub const INTERNAL_SECRET: &str = "internal-secret-for-tests";
pub const API_KEY: &str = "tg_test_customer_key";
pub const VIEWER_API_KEY: &str = "tg_test_viewer_key";

/// Plan with two requests per minute, used by the API-key principal
pub const TINY_PLAN: &str = "tiny";

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        enabled: true,
        store: CredentialStoreConfig::Memory {
            internal_keys: vec![InternalKeyRecord {
                id: "ops".to_string(),
                organization_id: "gateway".to_string(),
                digest: digest_secret(INTERNAL_SECRET),
                status: KeyStatus::Active,
                access_level: Role::Admin,
                expires_at: None,
            }],
            api_keys: vec![
                ApiKeyRecord {
                    id: "key-1".to_string(),
                    organization_id: "acme".to_string(),
                    digest: digest_secret(API_KEY),
                    active: true,
                    role: Role::Editor,
                    service_id: "svc-tiny".to_string(),
                    expires_at: None,
                },
                ApiKeyRecord {
                    id: "key-2".to_string(),
                    organization_id: "acme".to_string(),
                    digest: digest_secret(VIEWER_API_KEY),
                    active: true,
                    role: Role::Viewer,
                    service_id: "svc-free".to_string(),
                    expires_at: None,
                },
            ],
            services: vec![
                ServiceRecord {
                    id: "svc-tiny".to_string(),
                    plan: TINY_PLAN.to_string(),
                },
                ServiceRecord {
                    id: "svc-free".to_string(),
                    plan: "free".to_string(),
                },
            ],
        },
        ..AuthConfig::default()
    }
}

pub fn gateway_config() -> Config {
    let mut plans = RateLimitConfig::default().plans;
    plans.insert(
        TINY_PLAN.to_string(),
        PlanLimit {
            max_requests: 2,
            window_ms: 60_000,
        },
    );

    Config {
        auth: auth_config(),
        rate_limit: RateLimitConfig {
            default_plan: "free".to_string(),
            plans,
        },
        ..Config::default()
    }
}

/// Handler that parks until cancelled; records what happened
#[derive(Default)]
pub struct ParkedHandler {
    pub started: Notify,
    pub calls: AtomicUsize,
    pub cancelled: AtomicBool,
}

#[async_trait]
impl ToolHandler for ParkedHandler {
    async fn call(&self, _arguments: Value, _principal: &Principal, ctx: &ToolContext) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        tokio::select! {
            _ = ctx.cancellation.cancelled() => {
                self.cancelled.store(true, Ordering::SeqCst);
                Err(ToolError::failed("cancelled"))
            }
            _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(json!({ "finished": true })),
        }
    }
}

/// Registry with `echo` plus a `park` tool backed by the given handler
pub fn registry_with(parked: Arc<ParkedHandler>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(default_echo_tool()).unwrap();
    registry
        .register(ToolDefinition::new("park", parked).with_capability(toolgate::auth::Capability::Read))
        .unwrap();
    registry
}

pub fn state_with(config: &Config, registry: ToolRegistry) -> Arc<GatewayState> {
    Arc::new(GatewayState::with_registry(config, registry, ShutdownCoordinator::new()).unwrap())
}

pub fn start_gateway(state: Arc<GatewayState>) -> TestServer {
    let transports = TransportsConfig::default();
    start(move || {
        let transports = transports.clone();
        App::new()
            .app_data(web::Data::from(state.clone()))
            .configure(move |cfg| configure_routes(cfg, &transports))
    })
}

/// Poll until `check` holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
