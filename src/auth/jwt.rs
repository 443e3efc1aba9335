//! JWT bearer token authentication

use crate::auth::principal::{AuthMethod, Principal, Role};
use crate::auth::resolver::{CredentialResolver, Resolution, RequestMetadata};
use crate::config::JwtConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (principal id)
    pub sub: String,
    /// Organization id
    pub org: String,
    /// Access level
    pub role: Role,
    /// Rate-limit tier
    pub plan: String,
    /// Expiration timestamp
    pub exp: u64,
    /// Issued at timestamp
    pub iat: u64,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Resolver for `Authorization: Bearer <jwt>`.
///
/// Claims are trusted once the signature and expiry check out; there is no
/// store or network round trip.
pub struct BearerTokenResolver {
    header: String,
    decoding_key: Option<DecodingKey>,
    validation: Validation,
}

impl BearerTokenResolver {
    /// Without a JWT configuration every bearer token is rejected
    pub fn new(header: impl Into<String>, config: Option<&JwtConfig>) -> Result<Self> {
        let header = header.into();
        let config = match config {
            Some(config) => config,
            None => {
                return Ok(Self {
                    header,
                    decoding_key: None,
                    validation: Validation::default(),
                })
            }
        };

        let algorithm = parse_algorithm(&config.algorithm)?;
        let secret = config.secret.expose_secret().as_bytes();
        let decoding_key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => DecodingKey::from_secret(secret),
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => DecodingKey::from_rsa_pem(secret)
                .map_err(|e| GatewayError::config(format!("Invalid RSA public key: {}", e)))?,
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(secret)
                .map_err(|e| GatewayError::config(format!("Invalid ECDSA public key: {}", e)))?,
            other => {
                return Err(GatewayError::config(format!(
                    "Unsupported JWT algorithm: {:?}",
                    other
                )))
            }
        };

        let mut validation = Validation::new(algorithm);
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match config.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            header,
            decoding_key: Some(decoding_key),
            validation,
        })
    }
}

/// Parse an algorithm name from configuration
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    match name.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        _ => Err(GatewayError::config(format!("Unsupported JWT algorithm: {}", name))),
    }
}

#[async_trait]
impl CredentialResolver for BearerTokenResolver {
    fn name(&self) -> &'static str {
        "bearer_token"
    }

    async fn resolve(&self, metadata: &RequestMetadata) -> Resolution {
        let value = match metadata.header(&self.header) {
            Some(value) => value,
            None => return Resolution::NoMatch,
        };

        // Other authorization schemes are not ours to judge
        let token = match value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer ")) {
            Some(token) => token.trim(),
            None => return Resolution::NoMatch,
        };
        if token.is_empty() {
            return Resolution::Invalid("empty bearer token".to_string());
        }

        let decoding_key = match &self.decoding_key {
            Some(key) => key,
            None => return Resolution::Invalid("bearer tokens are not configured".to_string()),
        };

        match decode::<JwtClaims>(token, decoding_key, &self.validation) {
            Ok(data) => {
                let claims = data.claims;
                debug!("JWT validation successful for subject: {}", claims.sub);
                Resolution::Matched(Principal::new(
                    claims.sub,
                    claims.org,
                    claims.role,
                    claims.plan,
                    AuthMethod::BearerToken,
                ))
            }
            Err(e) => Resolution::Invalid(format!("JWT validation failed: {}", e)),
        }
    }
}
