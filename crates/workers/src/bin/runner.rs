//! Per-job runner: annotate the input, then finish the job.

use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;

use strata_core::{JobId, UserId};
use strata_infra::StrataConfig;
use strata_workers::{Deployment, FinishRequest, Finisher};

#[derive(Debug, Parser)]
#[command(name = "strata-runner", about = "Annotate one job's input and record its completion")]
struct Args {
    /// Local path of the downloaded input file.
    input: PathBuf,

    #[arg(long)]
    job_id: JobId,

    #[arg(long)]
    input_file_name: String,

    #[arg(long)]
    user_id: UserId,

    #[arg(long)]
    user_email: String,
}

fn main() -> anyhow::Result<()> {
    strata_observability::init();
    let args = Args::parse();

    let config = StrataConfig::from_env().context("invalid configuration")?;
    let annotator = config.annotator_program()?.clone();
    let workspace = std::env::current_dir().context("no working directory")?;

    let started = Instant::now();
    let status = Command::new(&annotator)
        .arg(&args.input)
        .current_dir(&workspace)
        .status()
        .with_context(|| format!("failed to run {}", annotator.display()))?;
    if !status.success() {
        bail!("{} exited with {status}", annotator.display());
    }
    info!(
        job_id = %args.job_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "annotation finished"
    );

    let deployment = Deployment::connect(config)?;
    let config = &deployment.config;
    let finisher = Finisher::new(
        deployment.job_table(),
        deployment.hot_store()?,
        deployment.bus(),
        config.results_bucket.clone(),
        config.results_prefix.clone(),
        config.topics.results.clone(),
    );

    finisher.finish(&FinishRequest {
        job_id: args.job_id,
        user_id: args.user_id,
        user_email: args.user_email,
        input_file_name: args.input_file_name,
        workspace,
    })?;
    Ok(())
}
