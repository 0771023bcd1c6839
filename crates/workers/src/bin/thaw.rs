use anyhow::Context;

use strata_infra::StrataConfig;
use strata_workers::{Deployment, QueueWorker, THAW_WAIT, ThawPoller};

fn main() -> anyhow::Result<()> {
    strata_observability::init();

    let config = StrataConfig::from_env().context("invalid configuration")?;
    let deployment = Deployment::connect(config)?;
    let config = &deployment.config;

    let poller = ThawPoller::new(
        deployment.job_table(),
        deployment.hot_store()?,
        deployment.cold_tier()?,
        config.results_bucket.clone(),
    );
    let queue = deployment.queue("thaw", &config.queues.thaw)?;

    QueueWorker::new("thaw", queue, poller, THAW_WAIT)
        .spawn()
        .context("failed to start thaw thread")?
        .join();
    Ok(())
}
