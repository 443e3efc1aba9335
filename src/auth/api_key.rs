//! API key authentication implementation

use crate::auth::principal::{AuthMethod, Principal};
use crate::auth::resolver::{digest_secret, redact, CredentialResolver, Resolution, RequestMetadata};
use crate::auth::store::ApiKeyStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolver for customer API keys.
///
/// Keys are matched by digest against active records; the plan comes from
/// the service configuration the key belongs to.
pub struct ApiKeyResolver {
    header: String,
    store: Arc<dyn ApiKeyStore>,
}

impl ApiKeyResolver {
    pub fn new(header: impl Into<String>, store: Arc<dyn ApiKeyStore>) -> Self {
        Self {
            header: header.into(),
            store,
        }
    }
}

#[async_trait]
impl CredentialResolver for ApiKeyResolver {
    fn name(&self) -> &'static str {
        "api_key"
    }

    async fn resolve(&self, metadata: &RequestMetadata) -> Resolution {
        let api_key = match metadata.header(&self.header) {
            Some(key) => key,
            None => return Resolution::NoMatch,
        };

        let digest = digest_secret(api_key);
        let key_entry = match self.store.find_active_api_key(&digest).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                return Resolution::Invalid(format!("invalid API key {}", redact(api_key)));
            }
            Err(e) => {
                warn!("API key lookup failed: {}", e);
                return Resolution::Invalid("API key store unavailable".to_string());
            }
        };

        if key_entry.is_expired(Utc::now()) {
            return Resolution::Invalid(format!("API key {} has expired", key_entry.id));
        }

        let service = match self.store.find_service(&key_entry.service_id).await {
            Ok(Some(service)) => service,
            Ok(None) => {
                return Resolution::Invalid(format!(
                    "API key {} references unknown service {}",
                    key_entry.id, key_entry.service_id
                ));
            }
            Err(e) => {
                warn!("Service lookup failed: {}", e);
                return Resolution::Invalid("API key store unavailable".to_string());
            }
        };

        debug!("API key validation successful for: {}", key_entry.id);
        Resolution::Matched(Principal::new(
            key_entry.id,
            key_entry.organization_id,
            key_entry.role,
            service.plan,
            AuthMethod::ApiKey,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::Role;
    use crate::auth::store::{ApiKeyRecord, MemoryCredentialStore, ServiceRecord};

    const KEY: &str = "ak_test_key_123456789";

    fn create_test_store() -> Arc<MemoryCredentialStore> {
        Arc::new(MemoryCredentialStore::new(
            vec![],
            vec![
                ApiKeyRecord {
                    id: "ak_1".to_string(),
                    organization_id: "org_acme".to_string(),
                    digest: digest_secret(KEY),
                    active: true,
                    role: Role::Viewer,
                    service_id: "svc_acme".to_string(),
                    expires_at: None,
                },
                ApiKeyRecord {
                    id: "ak_expired".to_string(),
                    organization_id: "org_acme".to_string(),
                    digest: digest_secret("expired_key_123456789"),
                    active: true,
                    role: Role::Viewer,
                    service_id: "svc_acme".to_string(),
                    expires_at: Some("2020-01-01T00:00:00Z".parse().unwrap()),
                },
            ],
            vec![ServiceRecord {
                id: "svc_acme".to_string(),
                plan: "pro".to_string(),
            }],
        ))
    }

    #[tokio::test]
    async fn test_valid_api_key() {
        let resolver = ApiKeyResolver::new("x-api-key", create_test_store());
        let metadata = RequestMetadata::new().with_header("X-Api-Key", KEY);

        match resolver.resolve(&metadata).await {
            Resolution::Matched(principal) => {
                assert_eq!(principal.id(), "ak_1");
                assert_eq!(principal.plan(), "pro");
                assert_eq!(principal.auth_method(), AuthMethod::ApiKey);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_api_key() {
        let resolver = ApiKeyResolver::new("x-api-key", create_test_store());
        let metadata = RequestMetadata::new().with_header("x-api-key", "invalid_key");
        assert!(matches!(resolver.resolve(&metadata).await, Resolution::Invalid(_)));
    }

    #[tokio::test]
    async fn test_single_character_flip_is_invalid() {
        let resolver = ApiKeyResolver::new("x-api-key", create_test_store());
        for i in 0..KEY.len() {
            let mut bytes = KEY.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'x' { b'y' } else { b'x' };
            let flipped = String::from_utf8(bytes).unwrap();
            let metadata = RequestMetadata::new().with_header("x-api-key", flipped);
            assert!(matches!(resolver.resolve(&metadata).await, Resolution::Invalid(_)));
        }
    }

    #[tokio::test]
    async fn test_missing_header() {
        let resolver = ApiKeyResolver::new("x-api-key", create_test_store());
        assert_eq!(resolver.resolve(&RequestMetadata::new()).await, Resolution::NoMatch);
    }

    #[tokio::test]
    async fn test_expired_key() {
        let resolver = ApiKeyResolver::new("x-api-key", create_test_store());
        let metadata = RequestMetadata::new().with_header("x-api-key", "expired_key_123456789");
        assert!(matches!(resolver.resolve(&metadata).await, Resolution::Invalid(_)));
    }

    #[tokio::test]
    async fn test_deactivated_key() {
        let store = create_test_store();
        let resolver = ApiKeyResolver::new("x-api-key", store.clone());
        let metadata = RequestMetadata::new().with_header("x-api-key", KEY);
        assert!(matches!(resolver.resolve(&metadata).await, Resolution::Matched(_)));

        store.deactivate_api_key("ak_1").unwrap();
        assert!(matches!(resolver.resolve(&metadata).await, Resolution::Invalid(_)));
    }
}
