//! Authentication module
//!
//! Every request on every transport is turned into a [`Principal`] by the
//! [`Authenticator`], which consults one resolver per credential scheme in a
//! fixed precedence order. Nothing is cached: revocation takes effect on the
//! next request.

pub mod api_key;
pub mod internal_key;
pub mod jwt;
pub mod middleware;
pub mod principal;
pub mod resolver;
pub mod store;
pub mod vendor_key;

pub use api_key::ApiKeyResolver;
pub use internal_key::InternalKeyResolver;
pub use jwt::{BearerTokenResolver, JwtClaims};
pub use middleware::{AuthFailure, Authenticator};
pub use principal::{AuthMethod, Capability, Principal, Role};
pub use resolver::{digest_secret, redact, CredentialResolver, RequestMetadata, Resolution};
pub use store::{
    ApiKeyRecord, ApiKeyStore, HttpCredentialStore, InternalKeyRecord, KeyStatus, MemoryCredentialStore,
    SecretRecordStore, ServiceRecord,
};
pub use vendor_key::{HttpVendorAuthority, VendorAuthority, VendorKeyResolver};
