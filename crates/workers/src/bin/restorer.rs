use anyhow::Context;

use strata_infra::StrataConfig;
use strata_workers::{Deployment, QueueWorker, RESTORE_WAIT, RestoreInitiator};

fn main() -> anyhow::Result<()> {
    strata_observability::init();

    let config = StrataConfig::from_env().context("invalid configuration")?;
    let deployment = Deployment::connect(config)?;
    let config = &deployment.config;

    let restorer = RestoreInitiator::new(
        deployment.job_table(),
        deployment.cold_tier()?,
        deployment.bus(),
        config.topics.thaw.clone(),
    );
    let queue = deployment.queue("restorer", &config.queues.restore)?;

    QueueWorker::new("restorer", queue, restorer, RESTORE_WAIT)
        .spawn()
        .context("failed to start restorer thread")?
        .join();
    Ok(())
}
