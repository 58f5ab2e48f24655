//! # CretoAI Dynamic Permission Authorization
//!
//! Claims-based authorization where policies do not have to be registered up
//! front. A protected operation names the permission it needs; the first
//! lookup of that name builds a policy wrapping a [`PermissionRequirement`],
//! memoizes it in a single-flight TTL cache, and every later request
//! evaluates it against the caller's claims.
//!
//! ## Features
//!
//! - **Static precedence**: policies from a [`PolicySource`] always win over
//!   synthesized ones
//! - **Single-flight cache**: concurrent first use of a name builds one policy
//! - **Lazy TTL expiry**: entries expire after [`CacheOptions::default_duration`]
//! - **Pure evaluation**: [`PermissionEvaluator`] never errors; a denial is an
//!   [`Outcome::Fail`] value
//!
//! ## Example
//!
//! ```rust
//! use cretoai_permission::{CacheOptions, ClaimSet, Outcome, PermissionEvaluator, PolicyResolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = PolicyResolver::without_static_policies(CacheOptions::default());
//!     let policy = resolver.resolve("orders.read").await?;
//!
//!     let claims = ClaimSet::new().with_permission("orders.read");
//!     let evaluator = PermissionEvaluator::new();
//!
//!     for requirement in policy.permission_requirements() {
//!         assert_eq!(evaluator.evaluate(&claims, requirement), Outcome::Succeed);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod policy;
pub mod privilege;
pub mod requirement;
pub mod resolver;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheOptions, CacheStats, PolicyCache, DEFAULT_CACHE_DURATION};
pub use config::AuthzConfig;
pub use engine::{
    AuthorizationDecision, Authorizer, EngineConfig, OperationRegistry, ProtectedOperation,
};
pub use error::{AuthzError, Result};
pub use evaluator::{Outcome, PermissionEvaluator, PolicyEvaluation, PolicyEvaluator};
pub use policy::{NoStaticPolicies, Policy, PolicyBuilder, PolicyOrigin, PolicySource, StaticPolicyRegistry};
pub use privilege::{Privilege, PrivilegeAction};
pub use requirement::{
    ClaimRequirement, CustomRequirement, PermissionRequirement, Requirement, RolesRequirement,
};
pub use resolver::{PermissionPolicySynthesizer, PolicyResolver};
pub use types::{Claim, ClaimSet, DYNAMIC_PERMISSION_CLAIM_TYPE, ROLE_CLAIM_TYPE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
