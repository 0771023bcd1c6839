//! Postgres-backed profile directory.

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::instrument;

use strata_core::{Role, UserId};

use super::{ProfileDirectory, ProfileError};
use crate::runtime::BlockingRuntime;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    role    TEXT NOT NULL CHECK (role IN ('free_user', 'premium_user'))
);
"#;

#[derive(Debug, Clone)]
pub struct PostgresProfiles {
    pool: Arc<PgPool>,
    runtime: BlockingRuntime,
}

impl PostgresProfiles {
    /// Share a pool (and its runtime) with another adapter.
    pub fn new(pool: Arc<PgPool>, runtime: BlockingRuntime) -> Self {
        Self { pool, runtime }
    }

    pub fn ensure_schema(&self) -> Result<(), ProfileError> {
        self.runtime
            .block_on(sqlx::raw_sql(SCHEMA).execute(&*self.pool))
            .map_err(|e| ProfileError::Storage(format!("ensure_schema failed: {e}")))?;
        Ok(())
    }
}

impl ProfileDirectory for PostgresProfiles {
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    fn get_role(&self, user_id: &UserId) -> Result<Role, ProfileError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query("SELECT role FROM profiles WHERE user_id = $1")
                    .bind(user_id.as_str())
                    .fetch_optional(&*self.pool),
            )
            .map_err(|e| ProfileError::Storage(format!("get_role failed: {e}")))?
            .ok_or_else(|| ProfileError::NotFound(user_id.clone()))?;

        let role: String = row
            .try_get("role")
            .map_err(|e| ProfileError::Storage(format!("failed to read profile row: {e}")))?;
        Ok(role.parse()?)
    }
}
