//! Requirement evaluation against a caller's claims
//!
//! [`PermissionEvaluator`] is the pure permission check. [`PolicyEvaluator`]
//! applies every requirement of a policy and succeeds only if all of them do.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::policy::Policy;
use crate::requirement::{ClaimRequirement, PermissionRequirement, Requirement, RolesRequirement};
use crate::types::{ClaimSet, ROLE_CLAIM_TYPE};

/// Result of checking a requirement; a failure is a value, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeed,
    Fail,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Outcome::Succeed
    }

    fn from_bool(ok: bool) -> Self {
        if ok {
            Outcome::Succeed
        } else {
            Outcome::Fail
        }
    }
}

/// Decides whether the caller holds a required dynamic permission
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionEvaluator;

impl PermissionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Succeed iff some claim of the dynamic permission type carries
    /// exactly the required permission
    pub fn evaluate(&self, claims: &ClaimSet, requirement: &PermissionRequirement) -> Outcome {
        let outcome = self.decide(claims, requirement);

        match outcome {
            Outcome::Succeed => {
                info!(
                    permission = %requirement.permission(),
                    "Authorization succeeded for requirement {}",
                    requirement.permission()
                );
            }
            Outcome::Fail => {
                warn!(
                    permission = %requirement.permission(),
                    "Authorization failed for requirement {}",
                    requirement.permission()
                );
            }
        }

        outcome
    }

    /// The decision alone, without logging
    pub fn decide(&self, claims: &ClaimSet, requirement: &PermissionRequirement) -> Outcome {
        Outcome::from_bool(
            claims
                .iter()
                .any(|claim| claim.grants_permission(requirement.permission())),
        )
    }
}

/// Outcome of a whole policy, with the requirements that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyEvaluation {
    pub outcome: Outcome,
    pub failed_requirements: Vec<Requirement>,
}

impl PolicyEvaluation {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Combines per-requirement outcomes with AND
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEvaluator {
    permissions: PermissionEvaluator,
}

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every requirement of `policy`
    ///
    /// All requirements are checked even after a failure so the result lists
    /// every unmet one. A policy with no requirements fails.
    pub fn evaluate(&self, claims: &ClaimSet, policy: &Policy) -> PolicyEvaluation {
        let failed_requirements: Vec<Requirement> = policy
            .requirements()
            .iter()
            .filter(|requirement| !self.evaluate_requirement(claims, requirement).is_success())
            .cloned()
            .collect();

        let outcome = Outcome::from_bool(
            !policy.requirements().is_empty() && failed_requirements.is_empty(),
        );

        PolicyEvaluation {
            outcome,
            failed_requirements,
        }
    }

    pub fn evaluate_requirement(&self, claims: &ClaimSet, requirement: &Requirement) -> Outcome {
        match requirement {
            Requirement::Permission(r) => self.permissions.evaluate(claims, r),
            Requirement::Roles(r) => evaluate_roles(claims, r),
            Requirement::Claim(r) => evaluate_claim(claims, r),
            Requirement::Custom(r) => r.evaluate(claims),
        }
    }
}

fn evaluate_roles(claims: &ClaimSet, requirement: &RolesRequirement) -> Outcome {
    Outcome::from_bool(
        requirement
            .roles()
            .iter()
            .any(|role| claims.has(ROLE_CLAIM_TYPE, role)),
    )
}

fn evaluate_claim(claims: &ClaimSet, requirement: &ClaimRequirement) -> Outcome {
    let allowed = requirement.allowed_values();
    if allowed.is_empty() {
        return Outcome::from_bool(claims.has_type(requirement.claim_type()));
    }

    Outcome::from_bool(
        claims
            .values_of(requirement.claim_type())
            .any(|value| allowed.iter().any(|a| a == value)),
    )
}
