use anyhow::Context;

use strata_infra::StrataConfig;
use strata_workers::{ARCHIVE_WAIT, Archiver, Deployment, QueueWorker};

fn main() -> anyhow::Result<()> {
    strata_observability::init();

    let config = StrataConfig::from_env().context("invalid configuration")?;
    let deployment = Deployment::connect(config)?;
    let config = &deployment.config;

    let archiver = Archiver::new(
        deployment.job_table(),
        deployment.profiles()?,
        deployment.hot_store()?,
        deployment.cold_tier()?,
        config.results_bucket.clone(),
    );
    let queue = deployment.queue("archiver", &config.queues.archive)?;

    QueueWorker::new("archiver", queue, archiver, ARCHIVE_WAIT)
        .spawn()
        .context("failed to start archiver thread")?
        .join();
    Ok(())
}
