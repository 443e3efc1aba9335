//! Credential record stores
//!
//! The gateway never owns credential persistence. It looks records up by the
//! digest of the presented secret through these traits. Two backends exist:
//! an in-memory store seeded from configuration and a REST client for the
//! external data store.

use crate::auth::principal::Role;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// Lifecycle status of an internal secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Suspended,
    Revoked,
}

/// Internal (operator-issued) secret record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalKeyRecord {
    pub id: String,
    pub organization_id: String,
    /// Lowercase hex SHA-256 of the secret
    pub digest: String,
    pub status: KeyStatus,
    pub access_level: Role,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl InternalKeyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Customer API key record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub organization_id: String,
    /// Lowercase hex SHA-256 of the key
    pub digest: String,
    pub active: bool,
    #[serde(default = "default_api_key_role")]
    pub role: Role,
    /// Service configuration the key belongs to
    pub service_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_api_key_role() -> Role {
    Role::Editor
}

impl ApiKeyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Service configuration an API key belongs to; carries the plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub plan: String,
}

/// Lookup of internal secrets by digest
#[async_trait]
pub trait SecretRecordStore: Send + Sync {
    /// Record with exactly this digest and `status = active`
    async fn find_active_internal_key(&self, digest: &str) -> Result<Option<InternalKeyRecord>>;
}

/// Lookup of customer API keys by digest
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Record with exactly this digest and `active = true`
    async fn find_active_api_key(&self, digest: &str) -> Result<Option<ApiKeyRecord>>;

    async fn find_service(&self, service_id: &str) -> Result<Option<ServiceRecord>>;
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    internal_keys: RwLock<Vec<InternalKeyRecord>>,
    api_keys: RwLock<Vec<ApiKeyRecord>>,
    services: RwLock<Vec<ServiceRecord>>,
}

impl MemoryCredentialStore {
    pub fn new(
        internal_keys: Vec<InternalKeyRecord>,
        api_keys: Vec<ApiKeyRecord>,
        services: Vec<ServiceRecord>,
    ) -> Self {
        Self {
            internal_keys: RwLock::new(internal_keys),
            api_keys: RwLock::new(api_keys),
            services: RwLock::new(services),
        }
    }

    /// Mark an internal key revoked; returns whether it existed
    pub fn revoke_internal_key(&self, id: &str) -> Result<bool> {
        let mut keys = self
            .internal_keys
            .write()
            .map_err(|_| GatewayError::store("internal key table poisoned"))?;
        match keys.iter_mut().find(|k| k.id == id) {
            Some(record) => {
                record.status = KeyStatus::Revoked;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deactivate an API key; returns whether it existed
    pub fn deactivate_api_key(&self, id: &str) -> Result<bool> {
        let mut keys = self
            .api_keys
            .write()
            .map_err(|_| GatewayError::store("api key table poisoned"))?;
        match keys.iter_mut().find(|k| k.id == id) {
            Some(record) => {
                record.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SecretRecordStore for MemoryCredentialStore {
    async fn find_active_internal_key(&self, digest: &str) -> Result<Option<InternalKeyRecord>> {
        let keys = self
            .internal_keys
            .read()
            .map_err(|_| GatewayError::store("internal key table poisoned"))?;
        Ok(keys
            .iter()
            .find(|k| k.digest == digest && k.status == KeyStatus::Active)
            .cloned())
    }
}

#[async_trait]
impl ApiKeyStore for MemoryCredentialStore {
    async fn find_active_api_key(&self, digest: &str) -> Result<Option<ApiKeyRecord>> {
        let keys = self
            .api_keys
            .read()
            .map_err(|_| GatewayError::store("api key table poisoned"))?;
        Ok(keys.iter().find(|k| k.digest == digest && k.active).cloned())
    }

    async fn find_service(&self, service_id: &str) -> Result<Option<ServiceRecord>> {
        let services = self
            .services
            .read()
            .map_err(|_| GatewayError::store("service table poisoned"))?;
        Ok(services.iter().find(|s| s.id == service_id).cloned())
    }
}

/// REST client for the external data store.
///
/// Tables are queried with PostgREST-style filters:
/// `GET {base}/internal_keys?digest=eq.<d>&status=eq.active`.
pub struct HttpCredentialStore {
    client: reqwest::Client,
    base_url: String,
    service_key: SecretString,
}

impl HttpCredentialStore {
    pub fn new(base_url: &str, service_key: SecretString, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    async fn query_first<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = format!("{}/{}", self.base_url, table);
        debug!("Querying credential store table {}", table);

        let response = self
            .client
            .get(&url)
            .query(filters)
            .query(&[("limit", "1")])
            .header("apikey", self.service_key.expose_secret().as_str())
            .bearer_auth(self.service_key.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::store(format!(
                "credential store returned {} for table {}",
                response.status(),
                table
            )));
        }

        let mut rows: Vec<T> = response.json().await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }
}

#[async_trait]
impl SecretRecordStore for HttpCredentialStore {
    async fn find_active_internal_key(&self, digest: &str) -> Result<Option<InternalKeyRecord>> {
        self.query_first(
            "internal_keys",
            &[
                ("digest", format!("eq.{}", digest)),
                ("status", "eq.active".to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl ApiKeyStore for HttpCredentialStore {
    async fn find_active_api_key(&self, digest: &str) -> Result<Option<ApiKeyRecord>> {
        self.query_first(
            "api_keys",
            &[
                ("digest", format!("eq.{}", digest)),
                ("active", "eq.true".to_string()),
            ],
        )
        .await
    }

    async fn find_service(&self, service_id: &str) -> Result<Option<ServiceRecord>> {
        self.query_first("services", &[("id", format!("eq.{}", service_id))])
            .await
    }
}
