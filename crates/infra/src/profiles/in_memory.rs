//! In-memory profile directory for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use strata_core::{Role, UserId};

use super::{ProfileDirectory, ProfileError};

#[derive(Debug, Default)]
pub struct InMemoryProfiles {
    roles: RwLock<HashMap<UserId, Role>>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or change a user's role (the upgrade flow's write side).
    pub fn set_role(&self, user_id: UserId, role: Role) {
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(user_id, role);
        }
    }
}

impl ProfileDirectory for InMemoryProfiles {
    fn get_role(&self, user_id: &UserId) -> Result<Role, ProfileError> {
        let roles = self
            .roles
            .read()
            .map_err(|_| ProfileError::Storage("profile lock poisoned".to_string()))?;
        roles
            .get(user_id)
            .copied()
            .ok_or_else(|| ProfileError::NotFound(user_id.clone()))
    }
}
