//! Configuration management for the gateway

use crate::auth::jwt::parse_algorithm;
use crate::auth::principal::{Capability, Role};
use crate::auth::store::{ApiKeyRecord, InternalKeyRecord, ServiceRecord};
use crate::config::keys::ConfigKey;
use crate::error::{GatewayError, Result};
use jsonwebtoken::Algorithm;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Network listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Which transport adapters to start
    #[serde(default)]
    pub transports: TransportsConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Plan-tiered rate limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Per-principal concurrency cap
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// Dispatcher settings
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Graceful shutdown settings
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Tool declarations; empty means the built-in `echo` tool only
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
        }
    }
}

/// Transport selection flags
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportsConfig {
    /// Newline-delimited JSON-RPC over stdin/stdout
    pub stdio: bool,
    /// `GET /tools`, `POST /tools/{name}`
    pub http: bool,
    /// JSON-RPC over a WebSocket at `/ws`
    pub websocket: bool,
    /// Server-Sent Events at `/events`
    pub sse: bool,
    /// Interval between SSE keep-alive comments (milliseconds)
    pub sse_keep_alive_ms: u64,
}

impl Default for TransportsConfig {
    fn default() -> Self {
        Self {
            stdio: false,
            http: true,
            websocket: true,
            sse: true,
            sse_keep_alive_ms: 15_000,
        }
    }
}

impl TransportsConfig {
    /// Whether any transport served by the HTTP listener is enabled
    pub fn any_network(&self) -> bool {
        self.http || self.websocket || self.sse
    }
}

/// Header names carrying each credential type
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialHeaders {
    pub vendor_key: String,
    pub internal_key: String,
    pub api_key: String,
    pub bearer: String,
}

impl Default for CredentialHeaders {
    fn default() -> Self {
        Self {
            vendor_key: "x-vendor-key".to_string(),
            internal_key: "x-internal-key".to_string(),
            api_key: "x-api-key".to_string(),
            bearer: "authorization".to_string(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When false every request runs as the anonymous principal
    pub enabled: bool,
    /// Credential header names
    pub headers: CredentialHeaders,
    /// Plan assigned to principals resolved from internal secrets
    pub internal_plan: String,
    /// Role of the anonymous principal (auth disabled)
    pub anonymous_role: Role,
    /// Plan of the anonymous principal (auth disabled)
    pub anonymous_plan: String,
    /// Bearer token verification
    pub jwt: Option<JwtConfig>,
    /// External authority for vendor keys
    pub vendor: Option<VendorAuthorityConfig>,
    /// Where secret records are looked up
    pub store: CredentialStoreConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headers: CredentialHeaders::default(),
            internal_plan: "internal".to_string(),
            anonymous_role: Role::Editor,
            anonymous_plan: "free".to_string(),
            jwt: None,
            vendor: None,
            store: CredentialStoreConfig::default(),
        }
    }
}

/// JWT configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret or PEM-encoded public key, depending on the algorithm
    pub secret: SecretString,
    /// Signing algorithm
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,
    /// Required issuer
    #[serde(default)]
    pub issuer: Option<String>,
    /// Required audience
    #[serde(default)]
    pub audience: Option<String>,
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

/// External vendor-key authority
#[derive(Debug, Clone, Deserialize)]
pub struct VendorAuthorityConfig {
    /// Validation endpoint (POST)
    pub validation_url: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_vendor_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_vendor_timeout_ms() -> u64 {
    5_000
}

/// Credential store backend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialStoreConfig {
    /// Records declared inline (local and test deployments)
    Memory {
        #[serde(default)]
        internal_keys: Vec<InternalKeyRecord>,
        #[serde(default)]
        api_keys: Vec<ApiKeyRecord>,
        #[serde(default)]
        services: Vec<ServiceRecord>,
    },
    /// Records served by the external data store's REST interface
    Http {
        base_url: String,
        service_key: SecretString,
        #[serde(default = "default_store_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Default for CredentialStoreConfig {
    fn default() -> Self {
        CredentialStoreConfig::Memory {
            internal_keys: Vec::new(),
            api_keys: Vec::new(),
            services: Vec::new(),
        }
    }
}

/// Limit for a single plan
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct PlanLimit {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

/// Plan-tiered rate limit configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Plan used when a principal's plan has no entry
    pub default_plan: String,
    /// Plan name to limit
    pub plans: HashMap<String, PlanLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut plans = HashMap::new();
        plans.insert(
            "free".to_string(),
            PlanLimit {
                max_requests: 60,
                window_ms: 60_000,
            },
        );
        plans.insert(
            "pro".to_string(),
            PlanLimit {
                max_requests: 600,
                window_ms: 60_000,
            },
        );
        plans.insert(
            "internal".to_string(),
            PlanLimit {
                max_requests: 6_000,
                window_ms: 60_000,
            },
        );
        Self {
            default_plan: "free".to_string(),
            plans,
        }
    }
}

/// Per-principal concurrency configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Simultaneously executing handlers per principal
    pub per_principal: usize,
    /// Invocations allowed to wait for a slot before backpressure kicks in
    pub queue_depth: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            per_principal: 8,
            queue_depth: 16,
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Default handler timeout in milliseconds
    pub handler_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 30_000,
        }
    }
}

/// Graceful shutdown configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight invocations to finish
    pub drain_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 10_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// A tool declaration
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Unique tool name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the arguments object
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
    /// Capability a principal needs to call the tool
    #[serde(default = "default_capability")]
    pub capability: Capability,
    /// Per-tool handler timeout override (milliseconds)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Which handler serves the tool
    pub handler: HandlerConfig,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

fn default_capability() -> Capability {
    Capability::Write
}

/// Handler selection for a declared tool
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Returns the arguments unchanged
    Echo,
    /// Forwards the call to the external data service
    Backend {
        /// Endpoint receiving `{arguments, principal}` as JSON
        endpoint: String,
    },
}

impl Config {
    /// Load .env files in order of precedence
    fn load_env_files() {
        let env = std::env::var("TOOLGATE_ENV").unwrap_or_else(|_| "development".to_string());

        let env_specific_file = format!(".env.{}", env);
        let env_files = [".env", env_specific_file.as_str(), ".env.local"];

        for env_file in env_files {
            match dotenvy::from_filename(env_file) {
                Ok(_) => {
                    tracing::info!("Loaded environment variables from {}", env_file);
                }
                Err(e) if e.not_found() => {
                    tracing::debug!("No {} file found, skipping", env_file);
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}", env_file, e);
                }
            }
        }
    }

    /// Load configuration from file with environment variables and CLI overrides
    pub fn load<P: AsRef<Path>>(
        path: P,
        host_override: Option<String>,
        port_override: Option<u16>,
    ) -> Result<Self> {
        Self::load_env_files();

        let mut config = if path.as_ref().exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                GatewayError::config(format!("Failed to read config file: {}", e))
            })?;
            Self::from_yaml(&content)?
        } else {
            tracing::warn!(
                "Config file {} not found, using defaults",
                path.as_ref().display()
            );
            Self::default()
        };

        // Precedence: .env < file < env < CLI
        config.apply_environment_overrides()?;

        if let Some(host) = host_override {
            config.server.host = host;
        }
        if let Some(port) = port_override {
            config.server.port = port;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document, expanding `${VAR}` references first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = shellexpand::env(content).map_err(|e| {
            GatewayError::config(format!("Failed to expand environment variable: {}", e))
        })?;
        serde_yaml::from_str(&expanded)
            .map_err(|e| GatewayError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply `TOOLGATE_*` environment variable overrides
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        for key in ConfigKey::ALL {
            if let Ok(value) = std::env::var(key.env_var()) {
                if !value.is_empty() {
                    self.set(*key, &value)?;
                }
            }
        }
        Ok(())
    }

    /// Read a scalar setting
    pub fn get(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::ServerHost => self.server.host.clone(),
            ConfigKey::ServerPort => self.server.port.to_string(),
            ConfigKey::TransportStdio => self.transports.stdio.to_string(),
            ConfigKey::TransportHttp => self.transports.http.to_string(),
            ConfigKey::TransportWebsocket => self.transports.websocket.to_string(),
            ConfigKey::TransportSse => self.transports.sse.to_string(),
            ConfigKey::AuthEnabled => self.auth.enabled.to_string(),
            ConfigKey::AuthInternalPlan => self.auth.internal_plan.clone(),
            ConfigKey::RateLimitDefaultPlan => self.rate_limit.default_plan.clone(),
            ConfigKey::ConcurrencyPerPrincipal => self.concurrency.per_principal.to_string(),
            ConfigKey::ConcurrencyQueueDepth => self.concurrency.queue_depth.to_string(),
            ConfigKey::DispatchHandlerTimeoutMs => self.dispatch.handler_timeout_ms.to_string(),
            ConfigKey::ShutdownDrainTimeoutMs => self.shutdown.drain_timeout_ms.to_string(),
            ConfigKey::LoggingLevel => self.logging.level.clone(),
            ConfigKey::LoggingFormat => self.logging.format.clone(),
        }
    }

    /// Overwrite a scalar setting from its string form
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::ServerHost => self.server.host = value.to_string(),
            ConfigKey::ServerPort => self.server.port = parse_value(key, value)?,
            ConfigKey::TransportStdio => self.transports.stdio = parse_value(key, value)?,
            ConfigKey::TransportHttp => self.transports.http = parse_value(key, value)?,
            ConfigKey::TransportWebsocket => self.transports.websocket = parse_value(key, value)?,
            ConfigKey::TransportSse => self.transports.sse = parse_value(key, value)?,
            ConfigKey::AuthEnabled => self.auth.enabled = parse_value(key, value)?,
            ConfigKey::AuthInternalPlan => self.auth.internal_plan = value.to_string(),
            ConfigKey::RateLimitDefaultPlan => self.rate_limit.default_plan = value.to_string(),
            ConfigKey::ConcurrencyPerPrincipal => {
                self.concurrency.per_principal = parse_value(key, value)?
            }
            ConfigKey::ConcurrencyQueueDepth => {
                self.concurrency.queue_depth = parse_value(key, value)?
            }
            ConfigKey::DispatchHandlerTimeoutMs => {
                self.dispatch.handler_timeout_ms = parse_value(key, value)?
            }
            ConfigKey::ShutdownDrainTimeoutMs => {
                self.shutdown.drain_timeout_ms = parse_value(key, value)?
            }
            ConfigKey::LoggingLevel => self.logging.level = value.to_string(),
            ConfigKey::LoggingFormat => self.logging.format = value.to_string(),
        }
        Ok(())
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;

        if !self.transports.stdio && !self.transports.any_network() {
            return Err(GatewayError::config("At least one transport must be enabled"));
        }
        if self.transports.sse && self.transports.sse_keep_alive_ms == 0 {
            return Err(GatewayError::config("SSE keep-alive interval cannot be 0"));
        }

        self.auth.validate()?;
        self.rate_limit.validate()?;

        if self.concurrency.per_principal == 0 {
            return Err(GatewayError::config(
                "Per-principal concurrency cap must be greater than 0",
            ));
        }
        if self.dispatch.handler_timeout_ms == 0 {
            return Err(GatewayError::config("Handler timeout cannot be 0"));
        }

        self.logging.validate()?;

        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(GatewayError::config("Tool name cannot be empty"));
            }
            if let HandlerConfig::Backend { endpoint } = &tool.handler {
                if !is_http_url(endpoint) {
                    return Err(GatewayError::config(format!(
                        "Backend endpoint for tool '{}' must start with http:// or https://",
                        tool.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn parse_value<T: FromStr>(key: ConfigKey, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        GatewayError::config(format!("Invalid value for {}: {}", key.env_var(), e))
    })
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(GatewayError::config("Server host cannot be empty"));
        }

        if !self
            .host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == ':' || c == '-')
        {
            return Err(GatewayError::config(format!(
                "Invalid host format: '{}'. Host must contain only alphanumeric characters, dots, colons, and hyphens",
                self.host
            )));
        }

        Ok(())
    }
}

impl AuthConfig {
    /// Validate authentication configuration
    pub fn validate(&self) -> Result<()> {
        let headers = [
            &self.headers.vendor_key,
            &self.headers.internal_key,
            &self.headers.api_key,
            &self.headers.bearer,
        ];
        if headers.iter().any(|h| h.trim().is_empty()) {
            return Err(GatewayError::config("Credential header names cannot be empty"));
        }

        if self.internal_plan.is_empty() {
            return Err(GatewayError::config("Internal plan name cannot be empty"));
        }

        if let Some(jwt) = &self.jwt {
            jwt.validate()?;
        }

        if let Some(vendor) = &self.vendor {
            if !is_http_url(&vendor.validation_url) {
                return Err(GatewayError::config(format!(
                    "Vendor validation URL must start with http:// or https://: '{}'",
                    vendor.validation_url
                )));
            }
        }

        if let CredentialStoreConfig::Http { base_url, .. } = &self.store {
            if !is_http_url(base_url) {
                return Err(GatewayError::config(format!(
                    "Credential store URL must start with http:// or https://: '{}'",
                    base_url
                )));
            }
        }

        Ok(())
    }
}

impl JwtConfig {
    /// Validate JWT configuration
    pub fn validate(&self) -> Result<()> {
        match parse_algorithm(&self.algorithm)? {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                if self.secret.expose_secret().len() < 32 {
                    return Err(GatewayError::config(
                        "JWT secret must be at least 32 characters long for security",
                    ));
                }
            }
            _ => {
                if self.secret.expose_secret().is_empty() {
                    return Err(GatewayError::config("JWT public key cannot be empty"));
                }
            }
        }
        Ok(())
    }
}

impl RateLimitConfig {
    /// Validate rate limit configuration
    pub fn validate(&self) -> Result<()> {
        if !self.plans.contains_key(&self.default_plan) {
            return Err(GatewayError::config(format!(
                "Default rate limit plan '{}' has no limit configured",
                self.default_plan
            )));
        }

        for (plan, limit) in &self.plans {
            if limit.max_requests == 0 || limit.window_ms == 0 {
                return Err(GatewayError::config(format!(
                    "Rate limit plan '{}' needs max_requests > 0 and window_ms > 0",
                    plan
                )));
            }
        }

        Ok(())
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Result<()> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(GatewayError::config(format!(
                    "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                    self.level
                )))
            }
        }

        match self.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => {
                return Err(GatewayError::config(format!(
                    "Invalid log format: '{}'. Valid formats: json, text",
                    self.format
                )))
            }
        }

        Ok(())
    }
}
