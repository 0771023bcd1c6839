//! Finisher: the runner's half of the job lifecycle (RUNNING → COMPLETED).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use strata_core::{Completion, JobId, JobStatus, JobUpdate, ObjectLocation, UserId, epoch_seconds};
use strata_events::{BusError, CompletionMessage, NotificationBus, PublishExt};
use strata_infra::{HotStore, HotStoreError, JobTable, JobTableError};

#[derive(Debug, Error)]
pub enum FinishError {
    #[error("input file name {0:?} has no usable stem")]
    BadInputName(String),

    #[error("failed to upload {file}: {source}")]
    Upload {
        file: PathBuf,
        #[source]
        source: HotStoreError,
    },

    #[error(transparent)]
    Table(#[from] JobTableError),

    #[error("job {0} is not RUNNING; completion not recorded")]
    NotRunning(JobId),

    #[error("failed to publish completion: {0}")]
    Publish(#[from] BusError),
}

/// What the runner knows about the job it just processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishRequest {
    pub job_id: JobId,
    pub user_id: UserId,
    pub user_email: String,
    pub input_file_name: String,
    /// Directory the annotator wrote its output into.
    pub workspace: PathBuf,
}

/// Local output files the annotator leaves behind for `input_file_name`.
pub fn output_files(input_file_name: &str) -> Option<(String, String)> {
    let stem = Path::new(input_file_name).file_stem()?.to_str()?;
    if stem.is_empty() {
        return None;
    }
    Some((format!("{stem}.annot.vcf"), format!("{stem}.vcf.count.log")))
}

/// Uploads results, completes the job and announces it.
pub struct Finisher {
    jobs: Arc<dyn JobTable>,
    hot: Arc<dyn HotStore>,
    bus: Arc<dyn NotificationBus>,
    results_bucket: String,
    results_prefix: String,
    results_topic: String,
}

impl Finisher {
    pub fn new(
        jobs: Arc<dyn JobTable>,
        hot: Arc<dyn HotStore>,
        bus: Arc<dyn NotificationBus>,
        results_bucket: impl Into<String>,
        results_prefix: impl Into<String>,
        results_topic: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            hot,
            bus,
            results_bucket: results_bucket.into(),
            results_prefix: results_prefix.into(),
            results_topic: results_topic.into(),
        }
    }

    /// `<prefix>/<user_id>/<job_id>~<file>`
    pub fn result_key(&self, user_id: &UserId, job_id: JobId, file: &str) -> String {
        if self.results_prefix.is_empty() {
            format!("{user_id}/{job_id}~{file}")
        } else {
            format!("{}/{user_id}/{job_id}~{file}", self.results_prefix)
        }
    }

    pub fn finish(&self, req: &FinishRequest) -> Result<CompletionMessage, FinishError> {
        let (result_name, log_name) = output_files(&req.input_file_name)
            .ok_or_else(|| FinishError::BadInputName(req.input_file_name.clone()))?;

        let result_file = self.upload(req, &result_name)?;
        let log_file = self.upload(req, &log_name)?;

        let complete_time = epoch_seconds();
        let update = JobUpdate::Complete(Completion {
            result_file: result_file.clone(),
            log_file,
            complete_time,
        });
        let applied = self
            .jobs
            .conditional_update(req.job_id, JobStatus::Running, update)?;
        if !applied.applied() {
            return Err(FinishError::NotRunning(req.job_id));
        }

        let message = CompletionMessage {
            job_id: req.job_id,
            user_id: req.user_id.clone(),
            input_file_name: req.input_file_name.clone(),
            complete_time,
            job_status: JobStatus::Completed,
            result_key: result_file.key,
            user_email: req.user_email.clone(),
        };
        info!(job_id = %req.job_id, user_id = %req.user_id, "job completed");

        // The job is COMPLETED from here on; a failed announcement is only reported.
        let published = self.bus.publish_message(&self.results_topic, &message);
        remove_workspace(req);
        published?;
        Ok(message)
    }

    fn upload(&self, req: &FinishRequest, file: &str) -> Result<ObjectLocation, FinishError> {
        let path = req.workspace.join(file);
        let location = ObjectLocation::new(
            &self.results_bucket,
            self.result_key(&req.user_id, req.job_id, file),
        );
        self.hot
            .upload_from(&path, &location)
            .map_err(|source| FinishError::Upload { file: path, source })?;
        Ok(location)
    }
}

fn remove_workspace(req: &FinishRequest) {
    if let Err(e) = std::fs::remove_dir_all(&req.workspace) {
        warn!(
            job_id = %req.job_id,
            path = %req.workspace.display(),
            error = %e,
            "failed to remove workspace"
        );
    }
}
