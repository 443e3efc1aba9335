//! Vendor key authentication
//!
//! Vendor keys have the shape `vk_<org>_<id>.<secret>`. The format is checked
//! locally, the organization id is taken from the public segment, and the
//! full key is then confirmed by one call to the vendor's validation
//! endpoint. Only an explicit `{"valid": true, "principal": {...}}` answer
//! produces a principal.

use crate::auth::principal::{AuthMethod, Principal, Role};
use crate::auth::resolver::{redact, CredentialResolver, Resolution, RequestMetadata};
use crate::config::VendorAuthorityConfig;
use crate::error::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

static VENDOR_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^vk_(?P<org>[A-Za-z0-9-]{3,64})_[A-Za-z0-9]{8,}\.[A-Za-z0-9_-]{16,}$")
        .unwrap_or_else(|e| unreachable!("vendor key pattern is a valid regex: {}", e))
});

/// A well-formed vendor key split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorKey<'a> {
    pub organization_id: &'a str,
    pub public_part: &'a str,
}

/// Check the key format and extract the organization id
pub fn parse_vendor_key(key: &str) -> Option<VendorKey<'_>> {
    let captures = VENDOR_KEY_PATTERN.captures(key)?;
    let organization_id = captures.name("org")?.as_str();
    let public_part = key.split('.').next()?;
    Some(VendorKey {
        organization_id,
        public_part,
    })
}

/// Request sent to the vendor authority
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorValidationRequest<'a> {
    pub key: &'a str,
    pub organization_id: &'a str,
}

/// Principal metadata returned by the authority
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorPrincipal {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default = "default_vendor_role")]
    pub role: Role,
    pub plan: String,
}

fn default_vendor_role() -> Role {
    Role::Editor
}

/// Authority response
#[derive(Debug, Clone, Deserialize)]
pub struct VendorValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub principal: Option<VendorPrincipal>,
}

/// The external authority that confirms vendor keys
#[async_trait]
pub trait VendorAuthority: Send + Sync {
    async fn validate(&self, key: &str, organization_id: &str) -> Result<VendorValidationResponse>;
}

/// Vendor authority reached over HTTP
pub struct HttpVendorAuthority {
    client: reqwest::Client,
    validation_url: String,
}

impl HttpVendorAuthority {
    pub fn new(config: &VendorAuthorityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            validation_url: config.validation_url.clone(),
        })
    }
}

#[async_trait]
impl VendorAuthority for HttpVendorAuthority {
    async fn validate(&self, key: &str, organization_id: &str) -> Result<VendorValidationResponse> {
        let response = self
            .client
            .post(&self.validation_url)
            .json(&VendorValidationRequest {
                key,
                organization_id,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Resolver for the vendor key header
pub struct VendorKeyResolver {
    header: String,
    authority: Option<Arc<dyn VendorAuthority>>,
}

impl VendorKeyResolver {
    /// Without an authority every vendor key is rejected
    pub fn new(header: impl Into<String>, authority: Option<Arc<dyn VendorAuthority>>) -> Self {
        Self {
            header: header.into(),
            authority,
        }
    }
}

#[async_trait]
impl CredentialResolver for VendorKeyResolver {
    fn name(&self) -> &'static str {
        "vendor_key"
    }

    async fn resolve(&self, metadata: &RequestMetadata) -> Resolution {
        let key = match metadata.header(&self.header) {
            Some(key) => key,
            None => return Resolution::NoMatch,
        };

        let parsed = match parse_vendor_key(key) {
            Some(parsed) => parsed,
            None => {
                return Resolution::Invalid(format!("malformed vendor key {}", redact(key)));
            }
        };

        let authority = match &self.authority {
            Some(authority) => authority,
            None => {
                return Resolution::Invalid("no vendor authority configured".to_string());
            }
        };

        let response = match authority.validate(key, parsed.organization_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    organization_id = %parsed.organization_id,
                    "Vendor key validation call failed: {}", e
                );
                return Resolution::Invalid("vendor authority unavailable".to_string());
            }
        };

        match (response.valid, response.principal) {
            (true, Some(vendor)) => {
                debug!("Vendor key {} accepted", parsed.public_part);
                let organization_id = vendor
                    .organization_id
                    .unwrap_or_else(|| parsed.organization_id.to_string());
                Resolution::Matched(Principal::new(
                    vendor.id,
                    organization_id,
                    vendor.role,
                    vendor.plan,
                    AuthMethod::VendorKey,
                ))
            }
            _ => Resolution::Invalid(format!("vendor key {} rejected by authority", parsed.public_part)),
        }
    }
}
