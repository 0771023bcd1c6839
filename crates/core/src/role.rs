//! Owner entitlement as reported by the profile service.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    FreeUser,
    PremiumUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::FreeUser => "free_user",
            Role::PremiumUser => "premium_user",
        }
    }

    /// Free-tier results are migrated to the cold tier; premium results stay hot.
    pub fn archives_results(&self) -> bool {
        matches!(self, Role::FreeUser)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free_user" => Ok(Role::FreeUser),
            "premium_user" => Ok(Role::PremiumUser),
            other => Err(DomainError::validation(format!("unknown role: {other}"))),
        }
    }
}
