//! Claim types presented by an authenticated caller

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthzError;

/// Claim type carrying a dynamic permission name
pub const DYNAMIC_PERMISSION_CLAIM_TYPE: &str = "DynamicPermission";

/// Claim type carrying a role name
pub const ROLE_CLAIM_TYPE: &str = "role";

/// A typed fact about the caller (e.g. `DynamicPermission=orders.read`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type
    #[serde(rename = "type")]
    pub claim_type: String,

    /// Claim value
    pub value: String,
}

impl Claim {
    /// Create a new claim
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }

    /// Create a dynamic permission claim
    pub fn permission(value: impl Into<String>) -> Self {
        Self::new(DYNAMIC_PERMISSION_CLAIM_TYPE, value)
    }

    /// Create a role claim
    pub fn role(value: impl Into<String>) -> Self {
        Self::new(ROLE_CLAIM_TYPE, value)
    }

    /// Whether this claim grants the given permission
    pub fn grants_permission(&self, permission: &str) -> bool {
        self.claim_type == DYNAMIC_PERMISSION_CLAIM_TYPE && self.value == permission
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.claim_type, self.value)
    }
}

/// Parses `type=value`
impl FromStr for Claim {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((claim_type, value)) if !claim_type.is_empty() => {
                Ok(Claim::new(claim_type.trim(), value.trim()))
            }
            _ => Err(AuthzError::Config(format!(
                "claim must be written as type=value, got '{}'",
                s
            ))),
        }
    }
}

/// Immutable set of claims for the duration of one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet {
    claims: Vec<Claim>,
}

impl ClaimSet {
    /// Create an empty claim set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a claim
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Add a dynamic permission claim
    pub fn with_permission(self, permission: impl Into<String>) -> Self {
        self.with_claim(Claim::permission(permission))
    }

    /// Add a role claim
    pub fn with_role(self, role: impl Into<String>) -> Self {
        self.with_claim(Claim::role(role))
    }

    /// Iterate over all claims
    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    /// Values of every claim of the given type
    pub fn values_of<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Whether any claim has the given type and value
    pub fn has(&self, claim_type: &str, value: &str) -> bool {
        self.claims
            .iter()
            .any(|c| c.claim_type == claim_type && c.value == value)
    }

    /// Whether any claim of the given type exists
    pub fn has_type(&self, claim_type: &str) -> bool {
        self.claims.iter().any(|c| c.claim_type == claim_type)
    }

    /// Permission names granted through dynamic permission claims
    pub fn permissions(&self) -> impl Iterator<Item = &str> {
        self.values_of(DYNAMIC_PERMISSION_CLAIM_TYPE)
    }

    /// Role names carried by the caller
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.values_of(ROLE_CLAIM_TYPE)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl FromIterator<Claim> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = Claim>>(iter: I) -> Self {
        Self {
            claims: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Claim>> for ClaimSet {
    fn from(claims: Vec<Claim>) -> Self {
        Self { claims }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_set_queries() {
        let claims = ClaimSet::new()
            .with_permission("orders.read")
            .with_permission("orders.write")
            .with_role("Admin")
            .with_claim(Claim::new("department", "sales"));

        assert_eq!(claims.len(), 4);
        assert!(claims.has(DYNAMIC_PERMISSION_CLAIM_TYPE, "orders.read"));
        assert!(!claims.has(DYNAMIC_PERMISSION_CLAIM_TYPE, "orders.delete"));
        assert!(claims.has_type("department"));
        assert_eq!(claims.permissions().collect::<Vec<_>>(), vec!["orders.read", "orders.write"]);
        assert_eq!(claims.roles().collect::<Vec<_>>(), vec!["Admin"]);
    }

    #[test]
    fn test_claim_grants_permission_requires_type() {
        assert!(Claim::permission("orders.read").grants_permission("orders.read"));
        assert!(!Claim::role("orders.read").grants_permission("orders.read"));
        assert!(!Claim::permission("orders.write").grants_permission("orders.read"));
    }

    #[test]
    fn test_claim_parsing() {
        let claim: Claim = "DynamicPermission=orders.read".parse().unwrap();
        assert_eq!(claim, Claim::permission("orders.read"));

        let claim: Claim = "role = Admin".parse().unwrap();
        assert_eq!(claim, Claim::role("Admin"));

        assert!("no-separator".parse::<Claim>().is_err());
        assert!("=value".parse::<Claim>().is_err());
    }

    #[test]
    fn test_claim_set_serializes_as_list() {
        let claims = ClaimSet::new().with_permission("orders.read");
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "type": "DynamicPermission", "value": "orders.read" }])
        );
    }
}
