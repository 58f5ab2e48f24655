//! Authorization pipeline
//!
//! Ties resolution and evaluation together for callers that want a complete
//! decision for a policy name or a registered operation.
//!
//! ```text
//! operation → OperationRegistry → policy name → PolicyResolver → Policy
//!                                                                  ↓
//!                                 ClaimSet ──────────────→ PolicyEvaluator
//!                                                                  ↓
//!                                                   AuthorizationDecision
//!                                                                  ↓
//!                                                              [Metrics]
//! ```

pub mod decision;
pub mod metrics;
pub mod operation;

pub use decision::AuthorizationDecision;
pub use metrics::{EngineMetrics, MetricsCollector};
pub use operation::{OperationRegistry, ProtectedOperation};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::cache::{CacheOptions, CacheStats};
use crate::config::AuthzConfig;
use crate::error::Result;
use crate::evaluator::PolicyEvaluator;
use crate::policy::PolicySource;
use crate::resolver::PolicyResolver;
use crate::types::ClaimSet;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Policy cache configuration
    pub cache: CacheOptions,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheOptions::default(),
            enable_metrics: true,
        }
    }
}

/// Resolves, evaluates and records authorization decisions
pub struct Authorizer {
    resolver: PolicyResolver,
    operations: Arc<OperationRegistry>,
    evaluator: PolicyEvaluator,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Authorizer {
    /// Create an authorizer
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid cache options.
    pub fn new(
        config: EngineConfig,
        static_source: Arc<dyn PolicySource>,
        operations: OperationRegistry,
    ) -> Result<Self> {
        config.cache.validate()?;

        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        info!(
            "Authorizer initialized with cache_duration={:?}, operations={}, metrics={}",
            config.cache.default_duration,
            operations.len(),
            config.enable_metrics
        );

        Ok(Self {
            resolver: PolicyResolver::new(static_source, config.cache),
            operations: Arc::new(operations),
            evaluator: PolicyEvaluator::new(),
            metrics,
        })
    }

    /// Create an authorizer from loaded configuration
    pub fn from_config(config: &AuthzConfig) -> Result<Self> {
        let engine_config = EngineConfig {
            cache: config.cache_options(),
            enable_metrics: config.metrics.enabled,
        };

        Self::new(
            engine_config,
            Arc::new(config.build_registry()?),
            config.build_operations()?,
        )
    }

    /// Decide whether `claims` satisfy the policy named `policy_name`
    ///
    /// A denial is returned as a decision with `allowed == false`; errors are
    /// reserved for invalid names and static source failures.
    pub async fn authorize(&self, policy_name: &str, claims: &ClaimSet) -> Result<AuthorizationDecision> {
        let start = Instant::now();

        let policy = match self.resolver.resolve(policy_name).await {
            Ok(policy) => policy,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_error().await;
                }
                return Err(e);
            }
        };

        let evaluation = self.evaluator.evaluate(claims, &policy);
        let decision = AuthorizationDecision::from_evaluation(&policy, &evaluation);

        debug!(
            "Decision: {} by policy '{}' ({:?})",
            if decision.allowed { "ALLOW" } else { "DENY" },
            decision.policy,
            decision.origin
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.allowed, decision.origin).await;
            metrics.record_latency(start.elapsed()).await;
        }

        Ok(decision)
    }

    /// Decide for a registered protected operation
    pub async fn authorize_operation(&self, operation: &str, claims: &ClaimSet) -> Result<AuthorizationDecision> {
        let policy_name = match self.operations.policy_for(operation) {
            Ok(name) => name,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_error().await;
                }
                return Err(e);
            }
        };

        let decision = self.authorize(policy_name, claims).await?;
        Ok(decision.with_operation(operation))
    }

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    /// Get pipeline metrics
    pub async fn get_metrics(&self) -> Option<EngineMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.get_metrics().await),
            None => None,
        }
    }

    /// Metrics in Prometheus text format, or `None` when metrics are disabled
    pub async fn export_prometheus(&self) -> Option<String> {
        match &self.metrics {
            Some(metrics) => Some(metrics.export_prometheus().await),
            None => None,
        }
    }

    /// Get policy cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.resolver.cache().stats()
    }
}
