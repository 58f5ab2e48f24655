//! Protected operation registry
//!
//! Each protected operation is registered once with the name of the policy
//! it requires. The pipeline looks the record up at dispatch time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AuthzError, Result};

/// Registration record for one protected operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedOperation {
    /// Operation identifier (e.g. "GET /orders")
    pub name: String,

    /// Policy required to invoke it
    pub policy: String,

    /// Optional description of the permission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProtectedOperation {
    pub fn new(name: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: policy.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// All protected operations, keyed by name
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, ProtectedOperation>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation
    ///
    /// # Errors
    ///
    /// Fails if the operation or policy name is empty, or the operation is
    /// already registered.
    pub fn register(&mut self, operation: ProtectedOperation) -> Result<&mut Self> {
        if operation.name.is_empty() {
            return Err(AuthzError::InvalidPolicy(
                "operation name must not be empty".to_string(),
            ));
        }
        if operation.policy.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "operation '{}' names no policy",
                operation.name
            )));
        }
        if self.operations.contains_key(&operation.name) {
            return Err(AuthzError::DuplicateOperation(operation.name));
        }

        self.operations.insert(operation.name.clone(), operation);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ProtectedOperation> {
        self.operations.get(name)
    }

    /// Policy name for `operation`
    pub fn policy_for(&self, operation: &str) -> Result<&str> {
        self.operations
            .get(operation)
            .map(|op| op.policy.as_str())
            .ok_or_else(|| AuthzError::OperationNotFound(operation.to_string()))
    }

    /// Registered operations, sorted by name
    pub fn list(&self) -> Vec<&ProtectedOperation> {
        let mut ops: Vec<_> = self.operations.values().collect();
        ops.sort_by(|a, b| a.name.cmp(&b.name));
        ops
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = OperationRegistry::new();
        registry
            .register(ProtectedOperation::new("GET /orders", "orders.read").with_description("List orders"))
            .unwrap()
            .register(ProtectedOperation::new("DELETE /orders", "orders.delete"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.policy_for("GET /orders").unwrap(), "orders.read");
        assert_eq!(
            registry.get("GET /orders").unwrap().description.as_deref(),
            Some("List orders")
        );
        assert_eq!(registry.list()[0].name, "DELETE /orders");
    }

    #[test]
    fn test_unknown_operation() {
        let registry = OperationRegistry::new();
        assert_eq!(
            registry.policy_for("GET /missing").unwrap_err(),
            AuthzError::OperationNotFound("GET /missing".to_string())
        );
    }

    #[test]
    fn test_register_rejects_invalid() {
        let mut registry = OperationRegistry::new();
        assert!(registry.register(ProtectedOperation::new("", "orders.read")).is_err());
        assert!(registry.register(ProtectedOperation::new("GET /orders", "")).is_err());

        registry.register(ProtectedOperation::new("GET /orders", "orders.read")).unwrap();
        assert!(matches!(
            registry.register(ProtectedOperation::new("GET /orders", "orders.list")),
            Err(AuthzError::DuplicateOperation(_))
        ));
    }
}
