//! Per-item privilege rules
//!
//! Where a policy answers "may this caller invoke the operation", a
//! [`Privilege`] answers "may this user act on this particular item", e.g.
//! only the author may edit a document. Implement it once per item type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::AuthzError;
use crate::evaluator::Outcome;

/// Action a user attempts on an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeAction {
    Create,
    Delete,
    Edit,
    View,
}

impl fmt::Display for PrivilegeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrivilegeAction::Create => "create",
            PrivilegeAction::Delete => "delete",
            PrivilegeAction::Edit => "edit",
            PrivilegeAction::View => "view",
        };
        f.write_str(name)
    }
}

impl FromStr for PrivilegeAction {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(PrivilegeAction::Create),
            "delete" => Ok(PrivilegeAction::Delete),
            "edit" => Ok(PrivilegeAction::Edit),
            "view" => Ok(PrivilegeAction::View),
            other => Err(AuthzError::Config(format!("unknown privilege action '{}'", other))),
        }
    }
}

/// Privilege rules for items of type `Item` acted on by `User`
pub trait Privilege<Item, User> {
    fn can_create(&self, item: &Item, user: &User) -> bool;

    fn can_delete(&self, item: &Item, user: &User) -> bool;

    fn can_edit(&self, item: &Item, user: &User) -> bool;

    fn can_view(&self, item: &Item, user: &User) -> bool;

    /// Dispatch on `action`
    fn can(&self, action: PrivilegeAction, item: &Item, user: &User) -> bool {
        match action {
            PrivilegeAction::Create => self.can_create(item, user),
            PrivilegeAction::Delete => self.can_delete(item, user),
            PrivilegeAction::Edit => self.can_edit(item, user),
            PrivilegeAction::View => self.can_view(item, user),
        }
    }

    /// Same as [`Privilege::can`], as an [`Outcome`]
    fn check(&self, action: PrivilegeAction, item: &Item, user: &User) -> Outcome {
        let allowed = self.can(action, item, user);
        debug!(%action, allowed, "Privilege check");
        if allowed {
            Outcome::Succeed
        } else {
            Outcome::Fail
        }
    }
}
