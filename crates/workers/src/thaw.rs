//! Thaw Poller: completes cold-tier retrievals back into the hot store.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use strata_core::{JobId, ObjectLocation};
use strata_events::ThawTracking;
use strata_infra::{
    ColdTier, ColdTierError, HotStore, HotStoreError, JobTable, JobTableError, RetrievalStatus,
};

use crate::outcome::Outcome;
use crate::poll::MessageHandler;

#[derive(Debug, Error)]
pub enum ThawError {
    #[error(transparent)]
    Table(#[from] JobTableError),

    #[error(transparent)]
    ColdTier(#[from] ColdTierError),

    #[error("failed to write restored result: {0}")]
    HotStore(#[from] HotStoreError),

    #[error("retrieval for job {0} failed in the cold tier")]
    RetrievalFailed(JobId),
}

/// Checks one retrieval per message and, once it has finished, moves the
/// object back:
/// 1. write the retrieved bytes to the job's result location
/// 2. delete the archive
/// 3. clear the job's archive id (conditional on it still naming this archive)
///
/// A retrieval that is still running is left on the queue and checked again
/// after the visibility timeout. Tracking for an archive the job no longer
/// points at (already restored, or archived again since) is dropped.
pub struct ThawPoller {
    jobs: Arc<dyn JobTable>,
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdTier>,
    results_bucket: String,
}

impl ThawPoller {
    pub fn new(
        jobs: Arc<dyn JobTable>,
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdTier>,
        results_bucket: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            hot,
            cold,
            results_bucket: results_bucket.into(),
        }
    }

    pub fn poll(&self, msg: &ThawTracking) -> Result<Outcome, ThawError> {
        if !self.still_archived(msg)? {
            debug!(job_id = %msg.job_id, archive_id = %msg.archive_id, "tracking is stale");
            return Ok(Outcome::Skip);
        }

        let status = match self.cold.retrieval_status(&msg.retrieval_job_id) {
            Ok(status) => status,
            Err(ColdTierError::RetrievalNotFound(_)) => {
                // Retrievals expire; a fresh restore request starts a new one.
                warn!(
                    job_id = %msg.job_id,
                    retrieval_job_id = %msg.retrieval_job_id,
                    "retrieval unknown to cold tier"
                );
                return Ok(Outcome::Retry);
            }
            Err(e) => return Err(e.into()),
        };

        match status {
            RetrievalStatus::InProgress => {
                debug!(
                    job_id = %msg.job_id,
                    retrieval_job_id = %msg.retrieval_job_id,
                    "retrieval still in progress"
                );
                Ok(Outcome::Retry)
            }
            RetrievalStatus::Failed => Err(ThawError::RetrievalFailed(msg.job_id)),
            RetrievalStatus::Succeeded => self.complete(msg),
        }
    }

    /// Whether the job still points at the archive this tracking restores.
    fn still_archived(&self, msg: &ThawTracking) -> Result<bool, ThawError> {
        Ok(self
            .jobs
            .get(msg.job_id)?
            .is_some_and(|job| job.archive_id.as_ref() == Some(&msg.archive_id)))
    }

    fn complete(&self, msg: &ThawTracking) -> Result<Outcome, ThawError> {
        let bytes = self.cold.retrieval_output(&msg.retrieval_job_id)?;
        let location = ObjectLocation::new(&self.results_bucket, &msg.result_key);
        self.hot.put(&location, bytes)?;
        self.cold.delete_archive(&msg.archive_id)?;

        let cleared = self
            .jobs
            .set_archive_id(msg.job_id, Some(&msg.archive_id), None)?;
        if !cleared.applied() {
            debug!(job_id = %msg.job_id, "archive id already cleared");
        }

        info!(job_id = %msg.job_id, location = %location, "result restored");
        Ok(Outcome::Handled)
    }
}

impl MessageHandler for ThawPoller {
    type Message = ThawTracking;

    fn handle(&self, msg: ThawTracking) -> Outcome {
        match self.poll(&msg) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %msg.job_id, error = %e, "thaw failed");
                Outcome::Retry
            }
        }
    }
}
