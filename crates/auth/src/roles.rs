use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Actor role used for authorization.
///
/// Roles form a total order of privilege: `Operator < Supervisor < Manager`.
/// The derived `Ord` follows declaration order, so keep variants sorted from
/// least to most privileged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Operator,
    Supervisor,
    Manager,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Operator, Role::Supervisor, Role::Manager];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Operator => "operator",
            Role::Supervisor => "supervisor",
            Role::Manager => "manager",
        }
    }

    /// Whether this role carries at least the privilege of `other`.
    pub fn includes(self, other: Role) -> bool {
        self >= other
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "operator" => Ok(Role::Operator),
            "supervisor" => Ok(Role::Supervisor),
            "manager" => Ok(Role::Manager),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}
