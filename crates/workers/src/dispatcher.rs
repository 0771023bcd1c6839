//! Dispatcher: claims submitted jobs and launches their runner.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use strata_core::{JobId, JobStatus, JobUpdate};
use strata_events::SubmissionMessage;
use strata_infra::{
    HotStore, HotStoreError, JobTable, JobTableError, LaunchError, LaunchSpec, ProcessLauncher,
};

use crate::outcome::Outcome;
use crate::poll::MessageHandler;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job {0} is not in the job table")]
    UnknownJob(JobId),

    #[error("unusable input file name {0:?}")]
    BadInputName(String),

    #[error("failed to prepare workspace {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to download input: {0}")]
    Download(#[from] HotStoreError),

    #[error(transparent)]
    Table(#[from] JobTableError),

    #[error("failed to launch runner: {0}")]
    Launch(#[from] LaunchError),
}

/// Moves a job PENDING → RUNNING and starts its runner.
///
/// Order per message:
/// 1. skip unless the stored job is still PENDING
/// 2. stage the input file in `<workspace_root>/<job_id>/`
/// 3. claim the job with a conditional PENDING → RUNNING update
/// 4. launch the runner, without waiting for it
///
/// Only the instance whose claim applies reaches step 4, so a job's runner is
/// launched at most once however many dispatchers see the submission. A
/// failed launch is therefore final: the message is acknowledged and the job
/// stays RUNNING, which is what operators see.
pub struct Dispatcher {
    jobs: Arc<dyn JobTable>,
    hot: Arc<dyn HotStore>,
    launcher: Arc<dyn ProcessLauncher>,
    workspace_root: PathBuf,
}

impl Dispatcher {
    pub fn new(
        jobs: Arc<dyn JobTable>,
        hot: Arc<dyn HotStore>,
        launcher: Arc<dyn ProcessLauncher>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            jobs,
            hot,
            launcher,
            workspace_root: workspace_root.into(),
        }
    }

    /// Local directory a job's runner works in.
    pub fn workspace_for(&self, job_id: JobId) -> PathBuf {
        self.workspace_root.join(job_id.to_string())
    }

    pub fn dispatch(&self, msg: &SubmissionMessage) -> Result<Outcome, DispatchError> {
        let job = self
            .jobs
            .get(msg.job_id)?
            .ok_or(DispatchError::UnknownJob(msg.job_id))?;
        if job.status != JobStatus::Pending {
            info!(job_id = %msg.job_id, status = %job.status, "job already dispatched");
            return Ok(Outcome::Skip);
        }

        let file_name = safe_file_name(&msg.input_file_name)
            .ok_or_else(|| DispatchError::BadInputName(msg.input_file_name.clone()))?;
        let workspace = self.workspace_for(msg.job_id);
        std::fs::create_dir_all(&workspace).map_err(|source| DispatchError::Workspace {
            path: workspace.clone(),
            source,
        })?;
        let input_path = workspace.join(file_name);
        self.hot.download_to(&msg.input_location(), &input_path)?;

        let claim = self
            .jobs
            .conditional_update(msg.job_id, JobStatus::Pending, JobUpdate::Start)?;
        if !claim.applied() {
            info!(job_id = %msg.job_id, "another dispatcher claimed the job");
            return Ok(Outcome::Skip);
        }

        let spec = LaunchSpec {
            job_id: msg.job_id,
            input_path,
            input_file_name: msg.input_file_name.clone(),
            user_id: msg.user_id.clone(),
            user_email: msg.user_email.clone(),
            workspace,
        };
        let pid = self.launcher.launch(&spec)?;

        info!(job_id = %msg.job_id, user_id = %msg.user_id, pid, "job running");
        Ok(Outcome::Handled)
    }
}

/// The last path component, refusing anything that would escape the workspace.
fn safe_file_name(name: &str) -> Option<&Path> {
    let file_name = Path::new(name).file_name()?;
    (file_name == Path::new(name).as_os_str()).then(|| Path::new(file_name))
}

impl MessageHandler for Dispatcher {
    type Message = SubmissionMessage;

    fn handle(&self, msg: SubmissionMessage) -> Outcome {
        match self.dispatch(&msg) {
            Ok(outcome) => outcome,
            Err(DispatchError::Launch(e)) => {
                // The claim already happened, so a redelivery could never
                // relaunch. The job stays RUNNING with no runner.
                error!(
                    job_id = %msg.job_id,
                    error = %e,
                    "claimed job could not be launched; job left RUNNING"
                );
                Outcome::Skip
            }
            Err(e @ (DispatchError::UnknownJob(_) | DispatchError::BadInputName(_))) => {
                warn!(job_id = %msg.job_id, error = %e, "submission left for inspection");
                Outcome::Retry
            }
            Err(e) => {
                error!(job_id = %msg.job_id, error = %e, "dispatch failed");
                Outcome::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{JobRecord, ObjectLocation, UserId};
    use strata_infra::{InMemoryHotStore, InMemoryJobTable, RecordingLauncher};

    use super::*;

    struct Fixture {
        jobs: Arc<InMemoryJobTable>,
        hot: Arc<InMemoryHotStore>,
        launcher: Arc<RecordingLauncher>,
        dispatcher: Dispatcher,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let jobs = Arc::new(InMemoryJobTable::new());
        let hot = Arc::new(InMemoryHotStore::new());
        let launcher = Arc::new(RecordingLauncher::new());
        let dispatcher = Dispatcher::new(jobs.clone(), hot.clone(), launcher.clone(), dir.path());
        Fixture {
            jobs,
            hot,
            launcher,
            dispatcher,
            _dir: dir,
        }
    }

    fn submit(f: &Fixture) -> SubmissionMessage {
        let input = ObjectLocation::new("inputs", "u-1/abc~sample.vcf");
        f.hot.put(&input, b"##fileformat=VCFv4.2".to_vec()).unwrap();
        let job = JobRecord::pending(
            JobId::new(),
            UserId::new("u-1").unwrap(),
            "u@example.com",
            "sample.vcf",
            input,
            1_700_000_000,
        );
        f.jobs.put(job.clone()).unwrap();
        SubmissionMessage::for_job(&job)
    }

    #[test]
    fn pending_job_is_claimed_staged_and_launched() {
        let f = fixture();
        let msg = submit(&f);

        assert_eq!(f.dispatcher.handle(msg.clone()), Outcome::Handled);

        let job = f.jobs.get(msg.job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);

        let launches = f.launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].workspace, f.dispatcher.workspace_for(msg.job_id));
        assert_eq!(
            std::fs::read(&launches[0].input_path).unwrap(),
            b"##fileformat=VCFv4.2"
        );
    }

    #[test]
    fn redelivered_submission_is_skipped_without_relaunch() {
        let f = fixture();
        let msg = submit(&f);
        assert_eq!(f.dispatcher.handle(msg.clone()), Outcome::Handled);
        assert_eq!(f.dispatcher.handle(msg.clone()), Outcome::Skip);
        assert_eq!(f.launcher.launch_count(msg.job_id), 1);
    }

    #[test]
    fn missing_input_is_retried_and_job_stays_pending() {
        let f = fixture();
        let mut msg = submit(&f);
        msg.input_key = "u-1/missing.vcf".into();

        assert_eq!(f.dispatcher.handle(msg.clone()), Outcome::Retry);
        assert_eq!(
            f.jobs.get(msg.job_id).unwrap().unwrap().status,
            JobStatus::Pending
        );
        assert!(f.launcher.launches().is_empty());
    }

    #[test]
    fn unknown_job_is_left_in_queue() {
        let f = fixture();
        let mut msg = submit(&f);
        msg.job_id = JobId::new();
        assert_eq!(f.dispatcher.handle(msg), Outcome::Retry);
    }

    #[test]
    fn launch_failure_acknowledges_and_leaves_job_running() {
        let f = fixture();
        let msg = submit(&f);
        f.launcher.set_refusing(true);

        let outcome = f.dispatcher.handle(msg.clone());
        assert_eq!(outcome, Outcome::Skip);
        assert!(outcome.acknowledges());
        assert_eq!(
            f.jobs.get(msg.job_id).unwrap().unwrap().status,
            JobStatus::Running
        );

        // A duplicate delivery after the launcher recovers must not launch.
        f.launcher.set_refusing(false);
        assert_eq!(f.dispatcher.handle(msg.clone()), Outcome::Skip);
        assert_eq!(f.launcher.launch_count(msg.job_id), 0);
        assert_eq!(
            f.jobs.get(msg.job_id).unwrap().unwrap().status,
            JobStatus::Running
        );
    }

    #[test]
    fn path_like_input_names_are_rejected() {
        assert!(safe_file_name("../../etc/passwd").is_none());
        assert!(safe_file_name("a/b.vcf").is_none());
        assert!(safe_file_name("..").is_none());
        assert_eq!(safe_file_name("sample.vcf"), Some(Path::new("sample.vcf")));
    }
}
