//! Wiring of the production adapters for the worker binaries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use strata_events::{MessageQueue, NotificationBus};
use strata_infra::cold_tier::GlacierColdTier;
use strata_infra::hot_store::S3HotStore;
use strata_infra::messaging::{RedisNotificationBus, RedisStreamQueue};
use strata_infra::{
    ColdTier, HotStore, JobTable, PostgresJobTable, PostgresProfiles, ProfileDirectory,
    StrataConfig,
};

/// Long-poll waits per worker.
pub const DISPATCH_WAIT: Duration = Duration::from_secs(5);
pub const ARCHIVE_WAIT: Duration = Duration::from_secs(5);
pub const RESTORE_WAIT: Duration = Duration::from_secs(5);
pub const THAW_WAIT: Duration = Duration::from_secs(2);

/// Shared handles to every external system a worker may talk to.
///
/// The Postgres pool and Redis client are opened once and shared by every
/// adapter handed out; AWS clients are built per call.
pub struct Deployment {
    pub config: StrataConfig,
    postgres: Arc<PostgresJobTable>,
    redis: Arc<redis::Client>,
}

impl Deployment {
    pub fn connect(config: StrataConfig) -> anyhow::Result<Self> {
        let postgres = PostgresJobTable::connect(&config.database_url)
            .context("failed to connect to the job table")?;
        postgres
            .ensure_schema()
            .context("failed to prepare the job table schema")?;

        let redis = redis::Client::open(config.redis_url.as_str())
            .context("invalid redis url")?;

        info!(bucket = %config.results_bucket, vault = %config.vault_name, "deployment ready");
        Ok(Self {
            config,
            postgres: Arc::new(postgres),
            redis: Arc::new(redis),
        })
    }

    pub fn job_table(&self) -> Arc<dyn JobTable> {
        self.postgres.clone()
    }

    pub fn profiles(&self) -> anyhow::Result<Arc<dyn ProfileDirectory>> {
        let profiles =
            PostgresProfiles::new(self.postgres.pool(), self.postgres.runtime().clone());
        profiles
            .ensure_schema()
            .context("failed to prepare the profiles schema")?;
        Ok(Arc::new(profiles))
    }

    pub fn bus(&self) -> Arc<dyn NotificationBus> {
        let bus = self
            .config
            .routes()
            .into_iter()
            .fold(RedisNotificationBus::with_client(self.redis.clone()), |bus, (topic, stream)| {
                bus.route(topic, stream)
            });
        Arc::new(bus)
    }

    /// Consume `stream` as one member of its worker group.
    pub fn queue(&self, worker: &str, stream: &str) -> anyhow::Result<Arc<dyn MessageQueue>> {
        let consumer = format!("{worker}-{}", std::process::id());
        let queue = RedisStreamQueue::with_client(
            self.redis.clone(),
            stream,
            consumer,
            self.config.visibility_timeout,
        )
        .with_context(|| format!("failed to open queue {stream}"))?;
        Ok(Arc::new(queue))
    }

    pub fn hot_store(&self) -> anyhow::Result<Arc<dyn HotStore>> {
        let store = S3HotStore::from_env(self.config.aws_region.as_deref())
            .context("failed to build the hot store client")?;
        Ok(Arc::new(store))
    }

    pub fn cold_tier(&self) -> anyhow::Result<Arc<dyn ColdTier>> {
        let tier = GlacierColdTier::from_env(
            self.config.vault_name.clone(),
            self.config.aws_region.as_deref(),
        )
        .context("failed to build the cold tier client")?;
        Ok(Arc::new(tier))
    }
}
