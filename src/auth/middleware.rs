//! Authentication aggregator shared by every transport

use crate::auth::api_key::ApiKeyResolver;
use crate::auth::internal_key::InternalKeyResolver;
use crate::auth::jwt::BearerTokenResolver;
use crate::auth::principal::{AuthMethod, Principal, Role};
use crate::auth::resolver::{CredentialResolver, Resolution, RequestMetadata};
use crate::auth::store::{ApiKeyStore, HttpCredentialStore, MemoryCredentialStore, SecretRecordStore};
use crate::auth::vendor_key::{HttpVendorAuthority, VendorAuthority, VendorKeyResolver};
use crate::config::{AuthConfig, CredentialStoreConfig};
use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a request could not be authenticated.
///
/// The specific reason stays server-side; [`fmt::Display`] only ever shows
/// the generic message sent to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// No credential of any supported kind was presented
    MissingCredentials,
    /// A credential was presented and rejected by the named resolver
    Rejected { resolver: &'static str, reason: String },
}

impl AuthFailure {
    /// Message safe to return to the caller
    pub fn public_message(&self) -> &'static str {
        "unauthorized"
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.public_message())
    }
}

/// Turns request metadata into a [`Principal`].
///
/// Resolvers are tried in a fixed order: vendor key, internal secret,
/// external secret, bearer token. The first match wins, an absent credential
/// falls through and a rejected one stops the chain.
pub struct Authenticator {
    enabled: bool,
    resolvers: Vec<Arc<dyn CredentialResolver>>,
    anonymous_role: Role,
    anonymous_plan: String,
}

impl Authenticator {
    /// Build an authenticator from explicit resolvers, in precedence order
    pub fn new(resolvers: Vec<Arc<dyn CredentialResolver>>) -> Self {
        Self {
            enabled: true,
            resolvers,
            anonymous_role: Role::Editor,
            anonymous_plan: "free".to_string(),
        }
    }

    /// Authenticator that accepts every request as the anonymous principal
    pub fn anonymous(role: Role, plan: impl Into<String>) -> Self {
        Self {
            enabled: false,
            resolvers: Vec::new(),
            anonymous_role: role,
            anonymous_plan: plan.into(),
        }
    }

    /// Wire up the standard resolver chain from configuration
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        if !config.enabled {
            info!("Authentication disabled; all requests run as the anonymous principal");
            return Ok(Self::anonymous(config.anonymous_role, config.anonymous_plan.clone()));
        }

        let (secret_store, api_key_store): (Arc<dyn SecretRecordStore>, Arc<dyn ApiKeyStore>) =
            match &config.store {
                CredentialStoreConfig::Memory {
                    internal_keys,
                    api_keys,
                    services,
                } => {
                    let store = Arc::new(MemoryCredentialStore::new(
                        internal_keys.clone(),
                        api_keys.clone(),
                        services.clone(),
                    ));
                    (store.clone(), store)
                }
                CredentialStoreConfig::Http {
                    base_url,
                    service_key,
                    timeout_ms,
                } => {
                    let store = Arc::new(HttpCredentialStore::new(
                        base_url,
                        service_key.clone(),
                        Duration::from_millis(*timeout_ms),
                    )?);
                    (store.clone(), store)
                }
            };

        let authority: Option<Arc<dyn VendorAuthority>> = match &config.vendor {
            Some(vendor) => Some(Arc::new(HttpVendorAuthority::new(vendor)?)),
            None => None,
        };

        let headers = &config.headers;
        let resolvers: Vec<Arc<dyn CredentialResolver>> = vec![
            Arc::new(VendorKeyResolver::new(headers.vendor_key.clone(), authority)),
            Arc::new(InternalKeyResolver::new(
                headers.internal_key.clone(),
                config.internal_plan.clone(),
                secret_store,
            )),
            Arc::new(ApiKeyResolver::new(headers.api_key.clone(), api_key_store)),
            Arc::new(BearerTokenResolver::new(headers.bearer.clone(), config.jwt.as_ref())?),
        ];

        Ok(Self::new(resolvers))
    }

    /// Resolve the principal for one request. Never cached.
    pub async fn authenticate(&self, metadata: &RequestMetadata) -> std::result::Result<Principal, AuthFailure> {
        if !self.enabled {
            return Ok(Principal::new(
                "anonymous",
                "anonymous",
                self.anonymous_role,
                self.anonymous_plan.clone(),
                AuthMethod::Anonymous,
            ));
        }

        for resolver in &self.resolvers {
            match resolver.resolve(metadata).await {
                Resolution::Matched(principal) => {
                    debug!(
                        principal_id = %principal.id(),
                        auth_type = resolver.name(),
                        "Authentication successful"
                    );
                    return Ok(principal);
                }
                Resolution::NoMatch => continue,
                Resolution::Invalid(reason) => {
                    warn!(
                        auth_type = resolver.name(),
                        remote_addr = ?metadata.peer(),
                        reason = %reason,
                        "Authentication failed"
                    );
                    return Err(AuthFailure::Rejected {
                        resolver: resolver.name(),
                        reason,
                    });
                }
            }
        }

        debug!(remote_addr = ?metadata.peer(), "No credentials presented");
        Err(AuthFailure::MissingCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedResolver {
        name: &'static str,
        outcome: Resolution,
        calls: AtomicUsize,
    }

    impl FixedResolver {
        fn new(name: &'static str, outcome: Resolution) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CredentialResolver for FixedResolver {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(&self, _metadata: &RequestMetadata) -> Resolution {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn principal(id: &str, method: AuthMethod) -> Principal {
        Principal::new(id, "org", Role::Editor, "free", method)
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let vendor = FixedResolver::new("vendor_key", Resolution::NoMatch);
        let internal = FixedResolver::new(
            "internal_key",
            Resolution::Matched(principal("ik", AuthMethod::InternalKey)),
        );
        let api = FixedResolver::new("api_key", Resolution::Matched(principal("ak", AuthMethod::ApiKey)));
        let auth = Authenticator::new(vec![vendor.clone(), internal.clone(), api.clone()]);

        let resolved = auth.authenticate(&RequestMetadata::new()).await.unwrap();
        assert_eq!(resolved.id(), "ik");
        assert_eq!(vendor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_short_circuits() {
        let vendor = FixedResolver::new("vendor_key", Resolution::Invalid("bad key".to_string()));
        let internal = FixedResolver::new(
            "internal_key",
            Resolution::Matched(principal("ik", AuthMethod::InternalKey)),
        );
        let auth = Authenticator::new(vec![vendor, internal.clone()]);

        let failure = auth.authenticate(&RequestMetadata::new()).await.unwrap_err();
        assert_eq!(
            failure,
            AuthFailure::Rejected {
                resolver: "vendor_key",
                reason: "bad key".to_string()
            }
        );
        assert_eq!(failure.to_string(), "unauthorized");
        assert_eq!(internal.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_credentials_is_unauthorized() {
        let auth = Authenticator::new(vec![
            FixedResolver::new("vendor_key", Resolution::NoMatch),
            FixedResolver::new("bearer_token", Resolution::NoMatch),
        ]);
        assert_eq!(
            auth.authenticate(&RequestMetadata::new()).await.unwrap_err(),
            AuthFailure::MissingCredentials
        );
    }

    #[tokio::test]
    async fn test_disabled_auth_is_anonymous() {
        let config = AuthConfig {
            enabled: false,
            ..AuthConfig::default()
        };
        let auth = Authenticator::from_config(&config).unwrap();
        let principal = auth.authenticate(&RequestMetadata::new()).await.unwrap();
        assert_eq!(principal.id(), "anonymous");
        assert_eq!(principal.auth_method(), AuthMethod::Anonymous);
        assert_eq!(principal.plan(), "free");
    }

    #[tokio::test]
    async fn test_from_config_uses_memory_store() {
        use crate::auth::resolver::digest_secret;
        use crate::auth::store::{ApiKeyRecord, ServiceRecord};

        let config = AuthConfig {
            store: CredentialStoreConfig::Memory {
                internal_keys: vec![],
                api_keys: vec![ApiKeyRecord {
                    id: "ak_1".to_string(),
                    organization_id: "org_1".to_string(),
                    digest: digest_secret("customer-key-0001"),
                    active: true,
                    role: Role::Editor,
                    service_id: "svc_1".to_string(),
                    expires_at: None,
                }],
                services: vec![ServiceRecord {
                    id: "svc_1".to_string(),
                    plan: "pro".to_string(),
                }],
            },
            ..AuthConfig::default()
        };
        let auth = Authenticator::from_config(&config).unwrap();

        let metadata = RequestMetadata::new().with_header("x-api-key", "customer-key-0001");
        let principal = auth.authenticate(&metadata).await.unwrap();
        assert_eq!(principal.plan(), "pro");

        // A bad internal key beats the valid API key because it comes first
        let metadata = metadata.with_header("x-internal-key", "not-a-real-secret");
        assert!(auth.authenticate(&metadata).await.is_err());
    }
}
