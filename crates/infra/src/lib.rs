//! Infrastructure layer: job table, object storage tiers, profile lookup,
//! Redis transport, process launching and configuration.
//!
//! Every adapter sits behind an object-safe trait with an in-memory
//! implementation for tests/dev.

pub mod cold_tier;
pub mod config;
pub mod hot_store;
pub mod job_table;
pub mod launcher;
pub mod profiles;
pub mod runtime;

#[cfg(feature = "aws")]
pub mod aws;
#[cfg(feature = "redis")]
pub mod messaging;

pub use cold_tier::{ColdTier, ColdTierError, InMemoryColdTier, RetrievalStatus, RetrievalTier};
pub use config::{ConfigError, QueueNames, StrataConfig, TopicNames};
pub use hot_store::{HotStore, HotStoreError, InMemoryHotStore};
pub use job_table::{ConditionalWrite, InMemoryJobTable, JobTable, JobTableError, PostgresJobTable};
pub use launcher::{CommandLauncher, LaunchError, LaunchSpec, ProcessLauncher, RecordingLauncher};
pub use profiles::{InMemoryProfiles, PostgresProfiles, ProfileDirectory, ProfileError};
pub use runtime::BlockingRuntime;
