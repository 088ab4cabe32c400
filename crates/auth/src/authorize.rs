use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::{Action, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: '{action}' requires {required}, actor is {actual}")]
    Forbidden {
        action: Action,
        required: Role,
        actual: Role,
    },

    #[error("no policy entry for '{0}'")]
    Unmapped(Action),
}

/// Role-per-action policy table.
///
/// Each action maps to the least privileged role allowed to perform it; any
/// role at or above that level is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    minimum_role: HashMap<Action, Role>,
}

impl Default for Policy {
    fn default() -> Self {
        let minimum_role = HashMap::from([
            (Action::ScheduleRelease, Role::Operator),
            (Action::ShipRelease, Role::Operator),
            (Action::DeliverRelease, Role::Operator),
            (Action::CreateOrder, Role::Supervisor),
            (Action::RegisterItem, Role::Supervisor),
            (Action::DeductStock, Role::Supervisor),
            (Action::AdjustStock, Role::Supervisor),
            (Action::CancelOrder, Role::Manager),
            (Action::CompleteOrder, Role::Manager),
        ]);
        Self { minimum_role }
    }
}

impl Policy {
    /// Build a policy from explicit entries. Unlisted actions are denied.
    pub fn from_entries(entries: impl IntoIterator<Item = (Action, Role)>) -> Self {
        Self {
            minimum_role: entries.into_iter().collect(),
        }
    }

    pub fn minimum_role(&self, action: Action) -> Option<Role> {
        self.minimum_role.get(&action).copied()
    }

    /// Pure policy check: no IO, no panics.
    pub fn check(&self, role: Role, action: Action) -> Result<(), AuthzError> {
        let required = self
            .minimum_role(action)
            .ok_or(AuthzError::Unmapped(action))?;

        if role.includes(required) {
            Ok(())
        } else {
            Err(AuthzError::Forbidden {
                action,
                required,
                actual: role,
            })
        }
    }

    /// Every action the role may perform, in `Action::ALL` order.
    pub fn allowed_actions(&self, role: Role) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|a| self.check(role, *a).is_ok())
            .collect()
    }
}

/// Authorize `role` for `action` against the default policy table.
pub fn authorize(role: Role, action: Action) -> Result<(), AuthzError> {
    Policy::default().check(role, action)
}
