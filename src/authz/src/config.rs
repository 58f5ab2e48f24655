//! Configuration loading and validation
//!
//! ```toml
//! [cache]
//! default_duration_secs = 900
//!
//! [[policies]]
//! name = "AdminPolicy"
//! roles = ["Admin"]
//!
//! [[policies]]
//! name = "ReadAccessPolicy"
//! claims = [{ type = "access", values = ["read"] }]
//!
//! [[operations]]
//! name = "GET /orders"
//! policy = "orders.read"
//! description = "List orders"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::cache::{CacheOptions, DEFAULT_CACHE_DURATION};
use crate::engine::ProtectedOperation;
use crate::engine::OperationRegistry;
use crate::error::{AuthzError, Result};
use crate::policy::{Policy, StaticPolicyRegistry};

/// Complete authorization configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthzConfig {
    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    /// Statically registered policies
    #[serde(default)]
    pub policies: Vec<StaticPolicyConfig>,

    /// Protected operations and the policy each requires
    #[serde(default)]
    pub operations: Vec<ProtectedOperation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_duration_secs")]
    pub default_duration_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            default_duration_secs: default_cache_duration_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// One static policy; every listed requirement must hold
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticPolicyConfig {
    pub name: String,

    /// Each entry becomes its own permission requirement
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Caller needs any one of these roles
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub claims: Vec<ClaimRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaimRuleConfig {
    #[serde(rename = "type")]
    pub claim_type: String,

    /// Empty means any value
    #[serde(default)]
    pub values: Vec<String>,
}

fn default_cache_duration_secs() -> u64 { DEFAULT_CACHE_DURATION.as_secs() }
fn default_true() -> bool { true }

impl StaticPolicyConfig {
    /// Build the policy this entry describes
    pub fn to_policy(&self) -> Result<Policy> {
        let mut builder = Policy::builder(self.name.as_str());

        for permission in &self.permissions {
            builder = builder.require_permission(permission.as_str())?;
        }
        if !self.roles.is_empty() {
            builder = builder.require_roles(self.roles.iter().map(String::as_str))?;
        }
        for claim in &self.claims {
            builder = builder.require_claim(claim.claim_type.as_str(), claim.values.iter().map(String::as_str))?;
        }

        builder.build()
    }
}

impl AuthzConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthzError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AuthzConfig = toml::from_str(contents)
            .map_err(|e| AuthzError::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.cache_options().validate()?;

        let mut names = HashSet::new();
        for policy in &self.policies {
            if !names.insert(policy.name.as_str()) {
                return Err(AuthzError::DuplicatePolicy(policy.name.clone()));
            }
            policy.to_policy()?;
        }

        let mut operations = HashSet::new();
        for operation in &self.operations {
            if !operations.insert(operation.name.as_str()) {
                return Err(AuthzError::DuplicateOperation(operation.name.clone()));
            }
        }

        Ok(())
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions::new(Duration::from_secs(self.cache.default_duration_secs))
    }

    /// Build the static policy registry
    pub fn build_registry(&self) -> Result<StaticPolicyRegistry> {
        let mut registry = StaticPolicyRegistry::new();
        for policy in &self.policies {
            registry.add_policy(policy.to_policy()?)?;
        }
        Ok(registry)
    }

    /// Build the operation registry
    pub fn build_operations(&self) -> Result<OperationRegistry> {
        let mut registry = OperationRegistry::new();
        for operation in &self.operations {
            registry.register(operation.clone())?;
        }
        Ok(registry)
    }
}
