//! Policy resolution by name
//!
//! Resolution is a two-stage lookup composed from two [`PolicySource`]s:
//!
//! ```text
//! resolve(name) → static source ──found──→ static policy
//!                      │
//!                    miss
//!                      ↓
//!               PermissionPolicySynthesizer → PolicyCache::get_or_create
//!                                                 ↓
//!                                 Policy { PermissionRequirement(name) }
//! ```
//!
//! Static policies always win; the cache is never consulted for a name the
//! static source knows.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheOptions, PolicyCache};
use crate::error::Result;
use crate::policy::{NoStaticPolicies, Policy, PolicySource};

/// Builds (and memoizes) a single-permission policy for any name
#[derive(Clone)]
pub struct PermissionPolicySynthesizer {
    cache: Arc<PolicyCache>,
}

impl PermissionPolicySynthesizer {
    pub fn new(cache: Arc<PolicyCache>) -> Self {
        Self { cache }
    }

    /// Get or build the permission policy for `name`
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthzError::InvalidPermission`] if `name` is empty.
    /// The failure is not cached.
    pub async fn synthesize(&self, name: &str) -> Result<Arc<Policy>> {
        let owned = name.to_string();
        self.cache
            .get_or_create(name, move || async move {
                let policy = Policy::for_permission(&owned)?;
                info!(policy = %owned, "Generated policy {}", owned);
                Ok(policy)
            })
            .await
    }

    pub fn cache(&self) -> &Arc<PolicyCache> {
        &self.cache
    }
}

#[async_trait]
impl PolicySource for PermissionPolicySynthesizer {
    async fn get_policy(&self, name: &str) -> Result<Option<Arc<Policy>>> {
        self.synthesize(name).await.map(Some)
    }
}

/// Resolves policy names, static source first
#[derive(Clone)]
pub struct PolicyResolver {
    static_source: Arc<dyn PolicySource>,
    synthesizer: PermissionPolicySynthesizer,
}

impl PolicyResolver {
    /// Create a resolver with its own cache
    pub fn new(static_source: Arc<dyn PolicySource>, options: CacheOptions) -> Self {
        Self::with_cache(static_source, Arc::new(PolicyCache::new(options)))
    }

    /// Create a resolver on top of an existing cache
    pub fn with_cache(static_source: Arc<dyn PolicySource>, cache: Arc<PolicyCache>) -> Self {
        Self {
            static_source,
            synthesizer: PermissionPolicySynthesizer::new(cache),
        }
    }

    /// Create a resolver that only synthesizes
    pub fn without_static_policies(options: CacheOptions) -> Self {
        Self::new(Arc::new(NoStaticPolicies), options)
    }

    /// Resolve `name` to a policy
    ///
    /// A missing static policy is not an error; it triggers synthesis.
    ///
    /// # Errors
    ///
    /// Propagates errors from the static source, and
    /// [`crate::AuthzError::InvalidPermission`] when synthesis is asked for an
    /// empty name.
    pub async fn resolve(&self, name: &str) -> Result<Arc<Policy>> {
        if let Some(policy) = self.static_source.get_policy(name).await? {
            debug!(policy = %name, "Resolved static policy");
            return Ok(policy);
        }

        self.synthesizer.synthesize(name).await
    }

    pub fn cache(&self) -> &Arc<PolicyCache> {
        self.synthesizer.cache()
    }
}

#[async_trait]
impl PolicySource for PolicyResolver {
    async fn get_policy(&self, name: &str) -> Result<Option<Arc<Policy>>> {
        self.resolve(name).await.map(Some)
    }
}
