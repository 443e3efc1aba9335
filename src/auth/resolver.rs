//! Credential resolver contract
//!
//! Each credential scheme implements [`CredentialResolver`]. A resolver looks
//! at the request metadata and answers with one of three outcomes: the
//! credential is absent, it produced a principal, or it is present but wrong.

use crate::auth::principal::Principal;
use actix_web::HttpRequest;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Transport-neutral view of the credential-bearing request metadata.
///
/// Header names are stored lowercased; lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    headers: HashMap<String, String>,
    peer: Option<String>,
}

impl RequestMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, replacing any previous value
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Header value, trimmed; empty values count as absent
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Peer address for diagnostics
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Capture the headers of an HTTP (or WebSocket upgrade) request
    pub fn from_http_request(req: &HttpRequest) -> Self {
        let mut metadata = Self::new();
        for (name, value) in req.headers() {
            if let Ok(value) = value.to_str() {
                metadata.insert(name.as_str(), value);
            }
        }
        if let Some(peer) = req.peer_addr() {
            metadata.peer = Some(peer.to_string());
        }
        metadata
    }
}

/// Outcome of a single resolver
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Credential present and valid
    Matched(Principal),
    /// Credential of this type not present
    NoMatch,
    /// Credential present but rejected; the reason is for server logs only
    Invalid(String),
}

/// A credential scheme able to turn request metadata into a principal.
///
/// Implementations must not mutate any state when they fail and must never
/// put the raw presented secret in a reason or log line; use [`redact`].
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Scheme name for logs
    fn name(&self) -> &'static str;

    async fn resolve(&self, metadata: &RequestMetadata) -> Resolution;
}

/// One-way digest used for at-rest secret lookup (lowercase hex SHA-256)
pub fn digest_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Diagnostic form of a secret: a short prefix only
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{}…", prefix)
}
