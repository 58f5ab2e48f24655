//! Authorization requirements
//!
//! A requirement is a single atomic condition a policy checks against the
//! caller's claims. Synthesized policies carry exactly one
//! [`PermissionRequirement`]; statically registered policies may also carry
//! role, claim and application-defined requirements.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthzError, Result};
use crate::evaluator::Outcome;
use crate::types::ClaimSet;

/// Requires the caller to hold a named dynamic permission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PermissionRequirement {
    permission: String,
}

impl PermissionRequirement {
    /// Create a requirement for `permission`
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidPermission`] if the name is empty.
    pub fn new(permission: impl Into<String>) -> Result<Self> {
        let permission = permission.into();
        if permission.is_empty() {
            return Err(AuthzError::InvalidPermission(
                "permission name must not be empty".to_string(),
            ));
        }

        Ok(Self { permission })
    }

    /// The required permission name
    pub fn permission(&self) -> &str {
        &self.permission
    }
}

impl fmt::Display for PermissionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permission '{}'", self.permission)
    }
}

impl<'de> Deserialize<'de> for PermissionRequirement {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            permission: String,
        }

        let raw = Raw::deserialize(deserializer)?;
        PermissionRequirement::new(raw.permission).map_err(serde::de::Error::custom)
    }
}

/// Requires the caller to hold any one of the listed roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolesRequirement {
    roles: Vec<String>,
}

impl RolesRequirement {
    pub fn new<I, S>(roles: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() || roles.iter().any(String::is_empty) {
            return Err(AuthzError::InvalidPolicy(
                "roles requirement needs at least one non-empty role".to_string(),
            ));
        }

        Ok(Self { roles })
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

impl fmt::Display for RolesRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "any role of [{}]", self.roles.join(", "))
    }
}

/// Requires a claim of the given type
///
/// With no allowed values any value of the type satisfies the requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimRequirement {
    claim_type: String,
    allowed_values: Vec<String>,
}

impl ClaimRequirement {
    pub fn new<I, S>(claim_type: impl Into<String>, allowed_values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let claim_type = claim_type.into();
        if claim_type.is_empty() {
            return Err(AuthzError::InvalidPolicy(
                "claim requirement needs a claim type".to_string(),
            ));
        }

        Ok(Self {
            claim_type,
            allowed_values: allowed_values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn claim_type(&self) -> &str {
        &self.claim_type
    }

    pub fn allowed_values(&self) -> &[String] {
        &self.allowed_values
    }
}

impl fmt::Display for ClaimRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.allowed_values.is_empty() {
            write!(f, "claim '{}'", self.claim_type)
        } else {
            write!(
                f,
                "claim '{}' in [{}]",
                self.claim_type,
                self.allowed_values.join(", ")
            )
        }
    }
}

/// Application-defined requirement
///
/// Implement this for checks the built-in requirements cannot express, then
/// register it with [`crate::StaticPolicyRegistry::add_custom_policy`] or
/// [`crate::PolicyBuilder::require_custom`]. Evaluation must be pure.
pub trait CustomRequirement: fmt::Debug + Send + Sync {
    /// Short name shown in decisions and logs
    fn name(&self) -> &str;

    fn evaluate(&self, claims: &ClaimSet) -> Outcome;
}

/// Any requirement a policy can hold
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Permission(PermissionRequirement),
    Roles(RolesRequirement),
    Claim(ClaimRequirement),
    Custom(#[serde(serialize_with = "serialize_custom")] Arc<dyn CustomRequirement>),
}

impl Requirement {
    /// Wrap an application-defined requirement
    pub fn custom(requirement: impl CustomRequirement + 'static) -> Self {
        Requirement::Custom(Arc::new(requirement))
    }

    /// The permission requirement, if this is one
    pub fn as_permission(&self) -> Option<&PermissionRequirement> {
        match self {
            Requirement::Permission(p) => Some(p),
            _ => None,
        }
    }
}

// Custom requirements are opaque, so two are equal only if they are the same
// instance.
impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Requirement::Permission(a), Requirement::Permission(b)) => a == b,
            (Requirement::Roles(a), Requirement::Roles(b)) => a == b,
            (Requirement::Claim(a), Requirement::Claim(b)) => a == b,
            (Requirement::Custom(a), Requirement::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Requirement {}

fn serialize_custom<S>(requirement: &Arc<dyn CustomRequirement>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry("name", requirement.name())?;
    map.end()
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Permission(r) => r.fmt(f),
            Requirement::Roles(r) => r.fmt(f),
            Requirement::Claim(r) => r.fmt(f),
            Requirement::Custom(r) => write!(f, "custom '{}'", r.name()),
        }
    }
}

impl From<PermissionRequirement> for Requirement {
    fn from(r: PermissionRequirement) -> Self {
        Requirement::Permission(r)
    }
}

impl From<RolesRequirement> for Requirement {
    fn from(r: RolesRequirement) -> Self {
        Requirement::Roles(r)
    }
}

impl From<ClaimRequirement> for Requirement {
    fn from(r: ClaimRequirement) -> Self {
        Requirement::Claim(r)
    }
}
