//! Owner entitlement lookup.
//!
//! Roles are written by the subscription flow outside this engine; the
//! Archiver only reads them.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use thiserror::Error;

use strata_core::{DomainError, Role, UserId};

pub use in_memory::InMemoryProfiles;
pub use postgres::PostgresProfiles;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("no profile for user {0}")]
    NotFound(UserId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("profile storage error: {0}")]
    Storage(String),
}

pub trait ProfileDirectory: Send + Sync {
    fn get_role(&self, user_id: &UserId) -> Result<Role, ProfileError>;
}

impl<T> ProfileDirectory for Arc<T>
where
    T: ProfileDirectory + ?Sized,
{
    fn get_role(&self, user_id: &UserId) -> Result<Role, ProfileError> {
        (**self).get_role(user_id)
    }
}
