//! The resolved identity of a single request

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability a tool requires from its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Admin,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Access level carried by a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "read", alias = "readonly")]
    Viewer,
    #[serde(alias = "write", alias = "developer")]
    Editor,
    #[serde(alias = "owner")]
    Admin,
}

impl Role {
    /// Whether this role grants the capability. Roles are cumulative.
    pub fn grants(&self, capability: Capability) -> bool {
        match self {
            Role::Admin => true,
            Role::Editor => matches!(capability, Capability::Read | Capability::Write),
            Role::Viewer => capability == Capability::Read,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Which credential produced the principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    VendorKey,
    InternalKey,
    ApiKey,
    BearerToken,
    Anonymous,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthMethod::VendorKey => "vendor_key",
            AuthMethod::InternalKey => "internal_key",
            AuthMethod::ApiKey => "api_key",
            AuthMethod::BearerToken => "bearer_token",
            AuthMethod::Anonymous => "anonymous",
        };
        f.write_str(name)
    }
}

/// Identity and authorization context of one request.
///
/// Built by the authenticator for every request and never cached, so a
/// revoked or expired credential stops working on the next call. Fields are
/// private to keep a principal immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    id: String,
    organization_id: String,
    role: Role,
    plan: String,
    auth_method: AuthMethod,
}

impl Principal {
    pub fn new(
        id: impl Into<String>,
        organization_id: impl Into<String>,
        role: Role,
        plan: impl Into<String>,
        auth_method: AuthMethod,
    ) -> Self {
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            role,
            plan: plan.into(),
            auth_method,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn plan(&self) -> &str {
        &self.plan
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// Key used for rate limiting and concurrency accounting.
    ///
    /// Identity-based, so the same caller shares one quota across every
    /// transport and connection.
    pub fn rate_key(&self) -> String {
        format!("{}:{}", self.organization_id, self.id)
    }

    /// Whether the principal may call a tool requiring `capability`
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.role.grants(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_grants_are_cumulative() {
        assert!(Role::Admin.grants(Capability::Admin));
        assert!(Role::Admin.grants(Capability::Read));
        assert!(Role::Editor.grants(Capability::Write));
        assert!(!Role::Editor.grants(Capability::Admin));
        assert!(Role::Viewer.grants(Capability::Read));
        assert!(!Role::Viewer.grants(Capability::Write));
    }

    #[test]
    fn test_role_aliases() {
        let role: Role = serde_json::from_str("\"write\"").unwrap();
        assert_eq!(role, Role::Editor);
        let role: Role = serde_json::from_str("\"read\"").unwrap();
        assert_eq!(role, Role::Viewer);
        let role: Role = serde_json::from_str("\"owner\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_rate_key_is_identity_based() {
        let a = Principal::new("u1", "org", Role::Viewer, "free", AuthMethod::ApiKey);
        let b = Principal::new("u1", "org", Role::Viewer, "free", AuthMethod::BearerToken);
        assert_eq!(a.rate_key(), b.rate_key());
    }
}
