//! The shared job table: single source of truth for job state.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryJobTable;
pub use postgres::PostgresJobTable;
pub use r#trait::{ConditionalWrite, JobTable, JobTableError};
