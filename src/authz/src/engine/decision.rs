//! Authorization decision records

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::evaluator::{Outcome, PolicyEvaluation};
use crate::policy::{Policy, PolicyOrigin};

/// A decision for one request, ready to be logged or returned
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationDecision {
    /// Unique decision ID
    pub id: String,

    /// Whether the caller may proceed
    pub allowed: bool,

    /// Name of the policy that decided
    pub policy: String,

    /// Static or synthesized
    pub origin: PolicyOrigin,

    /// Protected operation, when authorizing by operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Human-readable unmet requirements
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_requirements: Vec<String>,

    /// Decision timestamp
    pub timestamp: DateTime<Utc>,
}

impl AuthorizationDecision {
    /// Build a decision from a policy evaluation
    pub fn from_evaluation(policy: &Policy, evaluation: &PolicyEvaluation) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            allowed: evaluation.outcome == Outcome::Succeed,
            policy: policy.name().to_string(),
            origin: policy.origin(),
            operation: None,
            failed_requirements: evaluation
                .failed_requirements
                .iter()
                .map(ToString::to_string)
                .collect(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the protected operation name
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn outcome(&self) -> Outcome {
        if self.allowed {
            Outcome::Succeed
        } else {
            Outcome::Fail
        }
    }
}
