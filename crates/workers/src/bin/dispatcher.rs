use std::sync::Arc;

use anyhow::Context;

use strata_infra::{CommandLauncher, StrataConfig};
use strata_workers::{DISPATCH_WAIT, Deployment, Dispatcher, QueueWorker};

fn main() -> anyhow::Result<()> {
    strata_observability::init();

    let config = StrataConfig::from_env().context("invalid configuration")?;
    let deployment = Deployment::connect(config)?;
    let config = &deployment.config;

    // Runners start inside their workspace, so staged paths must not be relative.
    let workspace_root = std::path::absolute(&config.workspace_root)
        .with_context(|| format!("bad workspace root {}", config.workspace_root.display()))?;

    let dispatcher = Dispatcher::new(
        deployment.job_table(),
        deployment.hot_store()?,
        Arc::new(CommandLauncher::new(&config.runner_program)),
        workspace_root,
    );
    let queue = deployment.queue("dispatcher", &config.queues.submissions)?;

    QueueWorker::new("dispatcher", queue, dispatcher, DISPATCH_WAIT)
        .spawn()
        .context("failed to start dispatcher thread")?
        .join();
    Ok(())
}
