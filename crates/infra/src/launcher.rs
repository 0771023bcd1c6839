//! Launching the per-job runner as an independent child process.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{error, info, warn};

use strata_core::{JobId, UserId};

/// Everything the runner needs on its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub input_file_name: String,
    pub user_id: UserId,
    pub user_email: String,
    /// Working directory of the child; results are written here.
    pub workspace: PathBuf,
}

impl LaunchSpec {
    /// `input_path --job-id .. --input-file-name .. --user-id .. --user-email ..`
    pub fn args(&self) -> Vec<String> {
        vec![
            self.input_path.display().to_string(),
            "--job-id".to_string(),
            self.job_id.to_string(),
            "--input-file-name".to_string(),
            self.input_file_name.clone(),
            "--user-id".to_string(),
            self.user_id.to_string(),
            "--user-email".to_string(),
            self.user_email.clone(),
        ]
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("job {0} was already launched")]
    AlreadyLaunched(JobId),

    #[error("launch refused: {0}")]
    Refused(String),
}

/// Fire-and-forget process start.
///
/// `launch` returns as soon as the child exists; it never waits for the
/// job's work to finish.
pub trait ProcessLauncher: Send + Sync {
    /// Start the runner for one job, returning its process id.
    fn launch(&self, spec: &LaunchSpec) -> Result<u32, LaunchError>;
}

impl<T> ProcessLauncher for std::sync::Arc<T>
where
    T: ProcessLauncher + ?Sized,
{
    fn launch(&self, spec: &LaunchSpec) -> Result<u32, LaunchError> {
        (**self).launch(spec)
    }
}

/// Spawns a real program.
///
/// A detached reaper thread waits on each child so finished runners do not
/// linger as zombies and their exit status gets logged.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<u32, LaunchError> {
        let mut child = Command::new(&self.program)
            .args(spec.args())
            .current_dir(&spec.workspace)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        let job_id = spec.job_id;
        let reaper = std::thread::Builder::new()
            .name(format!("strata-reaper-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) if status.success() => {
                    info!(job_id = %job_id, pid, "runner exited")
                }
                Ok(status) => warn!(job_id = %job_id, pid, %status, "runner exited abnormally"),
                Err(e) => error!(job_id = %job_id, pid, error = %e, "failed to wait on runner"),
            });
        if let Err(e) = reaper {
            // The child still runs; it is reaped when this process exits.
            warn!(job_id = %job_id, pid, error = %e, "failed to start reaper thread");
        }

        Ok(pid)
    }
}

/// Test double that records launches instead of spawning anything.
///
/// Launching the same job twice is an error, so tests can prove the
/// at-most-once launch guarantee.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<LaunchSpec>>,
    refusing: AtomicBool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launched.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn launch_count(&self, job_id: JobId) -> usize {
        self.launches().iter().filter(|s| s.job_id == job_id).count()
    }

    /// Make every launch fail (as if the program were missing).
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<u32, LaunchError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(LaunchError::Refused("launcher is refusing".to_string()));
        }

        let mut launched = self
            .launched
            .lock()
            .map_err(|_| LaunchError::Refused("launch log poisoned".to_string()))?;
        if launched.iter().any(|s| s.job_id == spec.job_id) {
            return Err(LaunchError::AlreadyLaunched(spec.job_id));
        }
        launched.push(spec.clone());
        Ok(launched.len() as u32)
    }
}
