//! Internal secret authentication
//!
//! Operator-issued secrets are stored only as digests. The presented secret
//! is hashed and looked up by exact digest among active records; expired
//! records are rejected. Principals resolved this way always land on the
//! elevated internal plan.

use crate::auth::principal::{AuthMethod, Principal};
use crate::auth::resolver::{digest_secret, redact, CredentialResolver, Resolution, RequestMetadata};
use crate::auth::store::SecretRecordStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolver for the internal secret header
pub struct InternalKeyResolver {
    header: String,
    plan: String,
    store: Arc<dyn SecretRecordStore>,
}

impl InternalKeyResolver {
    pub fn new(header: impl Into<String>, plan: impl Into<String>, store: Arc<dyn SecretRecordStore>) -> Self {
        Self {
            header: header.into(),
            plan: plan.into(),
            store,
        }
    }
}

#[async_trait]
impl CredentialResolver for InternalKeyResolver {
    fn name(&self) -> &'static str {
        "internal_key"
    }

    async fn resolve(&self, metadata: &RequestMetadata) -> Resolution {
        let secret = match metadata.header(&self.header) {
            Some(secret) => secret,
            None => return Resolution::NoMatch,
        };

        let digest = digest_secret(secret);
        let record = match self.store.find_active_internal_key(&digest).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Resolution::Invalid(format!(
                    "no active internal key matches {}",
                    redact(secret)
                ))
            }
            Err(e) => {
                warn!("Internal key lookup failed: {}", e);
                return Resolution::Invalid("internal key store unavailable".to_string());
            }
        };

        if record.is_expired(Utc::now()) {
            return Resolution::Invalid(format!("internal key {} has expired", record.id));
        }

        debug!("Internal key {} resolved", record.id);
        Resolution::Matched(Principal::new(
            record.id,
            record.organization_id,
            record.access_level,
            self.plan.clone(),
            AuthMethod::InternalKey,
        ))
    }
}
