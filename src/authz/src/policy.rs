//! Policy definition and static policy sources

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::requirement::{
    ClaimRequirement, CustomRequirement, PermissionRequirement, Requirement, RolesRequirement,
};

/// Where a policy came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyOrigin {
    /// Registered at startup
    Static,
    /// Built on first use from a permission name
    Synthesized,
}

/// Named bundle of requirements, all of which must hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    name: String,
    requirements: Vec<Requirement>,
    origin: PolicyOrigin,
}

impl Policy {
    /// Start building a static policy
    pub fn builder(name: impl Into<String>) -> PolicyBuilder {
        PolicyBuilder::new(name)
    }

    /// Build the single-requirement policy for a permission name
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidPermission`] if `name` is empty.
    pub fn for_permission(name: &str) -> Result<Self> {
        let requirement = PermissionRequirement::new(name)?;
        Ok(Self {
            name: name.to_string(),
            requirements: vec![Requirement::Permission(requirement)],
            origin: PolicyOrigin::Synthesized,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn origin(&self) -> PolicyOrigin {
        self.origin
    }

    /// Permission requirements attached to this policy
    pub fn permission_requirements(&self) -> impl Iterator<Item = &PermissionRequirement> {
        self.requirements.iter().filter_map(Requirement::as_permission)
    }
}

/// Builder for static policies
#[derive(Debug)]
pub struct PolicyBuilder {
    name: String,
    requirements: Vec<Requirement>,
}

impl PolicyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirements: Vec::new(),
        }
    }

    pub fn add_requirement(mut self, requirement: impl Into<Requirement>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn require_permission(self, permission: impl Into<String>) -> Result<Self> {
        Ok(self.add_requirement(PermissionRequirement::new(permission)?))
    }

    pub fn require_roles<I, S>(self, roles: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.add_requirement(RolesRequirement::new(roles)?))
    }

    pub fn require_claim<I, S>(self, claim_type: impl Into<String>, allowed_values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.add_requirement(ClaimRequirement::new(claim_type, allowed_values)?))
    }

    /// Add an application-defined requirement
    pub fn require_custom(self, requirement: impl CustomRequirement + 'static) -> Self {
        self.add_requirement(Requirement::custom(requirement))
    }

    /// Finish the policy
    ///
    /// # Errors
    ///
    /// Fails if the name is empty or no requirement was added.
    pub fn build(self) -> Result<Policy> {
        if self.name.is_empty() {
            return Err(AuthzError::InvalidPolicy("policy name must not be empty".to_string()));
        }
        if self.requirements.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "policy '{}' has no requirements",
                self.name
            )));
        }

        Ok(Policy {
            name: self.name,
            requirements: self.requirements,
            origin: PolicyOrigin::Static,
        })
    }
}

/// Source of policies by name
///
/// `Ok(None)` means the source has no policy with that name, which is not an
/// error.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn get_policy(&self, name: &str) -> Result<Option<Arc<Policy>>>;
}

/// Source with no policies at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStaticPolicies;

#[async_trait]
impl PolicySource for NoStaticPolicies {
    async fn get_policy(&self, _name: &str) -> Result<Option<Arc<Policy>>> {
        Ok(None)
    }
}

/// Policies registered once at startup
///
/// Populate it with the `add_*` helpers, then share it read-only.
#[derive(Debug, Default)]
pub struct StaticPolicyRegistry {
    policies: HashMap<String, Arc<Policy>>,
}

impl StaticPolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prebuilt policy
    pub fn add_policy(&mut self, policy: Policy) -> Result<&mut Self> {
        if self.policies.contains_key(policy.name()) {
            return Err(AuthzError::DuplicatePolicy(policy.name().to_string()));
        }

        debug!(policy = %policy.name(), "Registered static policy");
        self.policies.insert(policy.name().to_string(), Arc::new(policy));
        Ok(self)
    }

    /// Register a policy requiring any of `roles`
    pub fn add_roles_policy<I, S>(&mut self, name: &str, roles: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let policy = Policy::builder(name).require_roles(roles)?.build()?;
        self.add_policy(policy)
    }

    /// Register a policy requiring a claim of `claim_type` with one of `values`
    pub fn add_claims_policy<I, S>(&mut self, name: &str, claim_type: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let policy = Policy::builder(name).require_claim(claim_type, values)?.build()?;
        self.add_policy(policy)
    }

    /// Register a policy built around one application-defined requirement
    pub fn add_custom_policy(
        &mut self,
        name: &str,
        requirement: impl CustomRequirement + 'static,
    ) -> Result<&mut Self> {
        let policy = Policy::builder(name).require_custom(requirement).build()?;
        self.add_policy(policy)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    /// Registered policy names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[async_trait]
impl PolicySource for StaticPolicyRegistry {
    async fn get_policy(&self, name: &str) -> Result<Option<Arc<Policy>>> {
        Ok(self.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_for_permission() {
        let policy = Policy::for_permission("orders.read").unwrap();
        assert_eq!(policy.name(), "orders.read");
        assert_eq!(policy.origin(), PolicyOrigin::Synthesized);
        assert_eq!(policy.requirements().len(), 1);

        let perms: Vec<_> = policy.permission_requirements().collect();
        assert_eq!(perms[0].permission(), "orders.read");
    }

    #[test]
    fn test_policy_for_empty_permission_fails() {
        assert!(matches!(
            Policy::for_permission(""),
            Err(AuthzError::InvalidPermission(_))
        ));
    }

    #[test]
    fn test_builder_requires_requirements() {
        let err = Policy::builder("Empty").build().unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));

        let err = Policy::builder("")
            .require_permission("orders.read")
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_builder_combines_requirements() {
        let policy = Policy::builder("OrdersAdmin")
            .require_permission("orders.read")
            .unwrap()
            .require_roles(["Admin"])
            .unwrap()
            .require_claim("department", ["sales"])
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(policy.origin(), PolicyOrigin::Static);
        assert_eq!(policy.requirements().len(), 3);
        assert_eq!(policy.permission_requirements().count(), 1);
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let mut registry = StaticPolicyRegistry::new();
        registry
            .add_roles_policy("AdminPolicy", ["Admin"])
            .unwrap()
            .add_claims_policy("ReadAccessPolicy", "access", ["read"])
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["AdminPolicy", "ReadAccessPolicy"]);

        let found = registry.get_policy("AdminPolicy").await.unwrap();
        assert_eq!(found.unwrap().name(), "AdminPolicy");
        assert!(registry.get_policy("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = StaticPolicyRegistry::new();
        registry.add_roles_policy("AdminPolicy", ["Admin"]).unwrap();

        let err = registry.add_roles_policy("AdminPolicy", ["Root"]).unwrap_err();
        assert_eq!(err, AuthzError::DuplicatePolicy("AdminPolicy".to_string()));
    }

    #[tokio::test]
    async fn test_no_static_policies() {
        assert!(NoStaticPolicies.get_policy("anything").await.unwrap().is_none());
    }
}
