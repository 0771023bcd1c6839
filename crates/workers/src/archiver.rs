//! Archiver: migrates free-tier results from the hot store to the cold tier.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use strata_core::{JobId, JobStatus, ObjectLocation};
use strata_events::ArchiveCandidate;
use strata_infra::{
    ColdTier, ColdTierError, HotStore, HotStoreError, JobTable, JobTableError, ProfileDirectory,
    ProfileError,
};

use crate::outcome::Outcome;
use crate::poll::MessageHandler;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("job {0} is not in the job table")]
    UnknownJob(JobId),

    #[error(transparent)]
    Table(#[from] JobTableError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    HotStore(#[from] HotStoreError),

    #[error(transparent)]
    ColdTier(#[from] ColdTierError),
}

/// Moves a completed result into the cold tier.
///
/// Steps run in this order so that at every instant at least one copy of the
/// result is reachable from the job record:
/// 1. upload the hot copy to the cold tier
/// 2. record the archive id on the job (conditional on it being unset)
/// 3. delete the hot copy
///
/// A job that already carries an archive id only needs step 3, which makes
/// redelivery after a crash between steps 2 and 3 converge.
pub struct Archiver {
    jobs: Arc<dyn JobTable>,
    profiles: Arc<dyn ProfileDirectory>,
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdTier>,
    results_bucket: String,
}

impl Archiver {
    pub fn new(
        jobs: Arc<dyn JobTable>,
        profiles: Arc<dyn ProfileDirectory>,
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdTier>,
        results_bucket: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            profiles,
            hot,
            cold,
            results_bucket: results_bucket.into(),
        }
    }

    pub fn archive(&self, msg: &ArchiveCandidate) -> Result<Outcome, ArchiveError> {
        let job = self
            .jobs
            .get(msg.job_id)?
            .ok_or(ArchiveError::UnknownJob(msg.job_id))?;
        let location = job
            .result_file
            .clone()
            .unwrap_or_else(|| ObjectLocation::new(&self.results_bucket, &msg.result_key));

        if let Some(archive_id) = &job.archive_id {
            self.hot.delete(&location)?;
            info!(job_id = %msg.job_id, archive_id = %archive_id, "result already archived");
            return Ok(Outcome::Handled);
        }
        if job.status != JobStatus::Completed {
            warn!(job_id = %msg.job_id, status = %job.status, "archive request for unfinished job");
            return Ok(Outcome::Retry);
        }

        let role = self.profiles.get_role(&msg.user_id)?;
        if !role.archives_results() {
            info!(job_id = %msg.job_id, user_id = %msg.user_id, %role, "results stay hot");
            return Ok(Outcome::Skip);
        }

        let Some(bytes) = self.hot.get(&location)? else {
            warn!(job_id = %msg.job_id, location = %location, "no hot result to archive");
            return Ok(Outcome::Skip);
        };

        let archive_id = self
            .cold
            .upload_archive(bytes, &format!("strata job {}", msg.job_id))?;

        let recorded = self.jobs.set_archive_id(msg.job_id, None, Some(&archive_id))?;
        if !recorded.applied() {
            // Another archiver recorded its own copy first; ours is an orphan.
            info!(job_id = %msg.job_id, archive_id = %archive_id, "lost archive race");
            if let Err(e) = self.cold.delete_archive(&archive_id) {
                warn!(archive_id = %archive_id, error = %e, "failed to remove orphan archive");
            }
        }

        self.hot.delete(&location)?;
        info!(job_id = %msg.job_id, archive_id = %archive_id, "result archived");
        Ok(Outcome::Handled)
    }
}

impl MessageHandler for Archiver {
    type Message = ArchiveCandidate;

    fn handle(&self, msg: ArchiveCandidate) -> Outcome {
        match self.archive(&msg) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %msg.job_id, error = %e, "archiving failed");
                Outcome::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Completion, JobRecord, JobUpdate, Role, UserId};
    use strata_infra::{InMemoryColdTier, InMemoryHotStore, InMemoryJobTable, InMemoryProfiles};

    use super::*;

    struct Fixture {
        jobs: Arc<InMemoryJobTable>,
        profiles: Arc<InMemoryProfiles>,
        hot: Arc<InMemoryHotStore>,
        cold: Arc<InMemoryColdTier>,
        archiver: Archiver,
    }

    fn fixture() -> Fixture {
        let jobs = Arc::new(InMemoryJobTable::new());
        let profiles = Arc::new(InMemoryProfiles::new());
        let hot = Arc::new(InMemoryHotStore::new());
        let cold = Arc::new(InMemoryColdTier::new());
        let archiver = Archiver::new(
            jobs.clone(),
            profiles.clone(),
            hot.clone(),
            cold.clone(),
            "results",
        );
        Fixture {
            jobs,
            profiles,
            hot,
            cold,
            archiver,
        }
    }

    fn completed_job(f: &Fixture, role: Role) -> (ArchiveCandidate, ObjectLocation) {
        let user = UserId::new("u-1").unwrap();
        f.profiles.set_role(user.clone(), role);

        let job = JobRecord::pending(
            JobId::new(),
            user.clone(),
            "u@example.com",
            "sample.vcf",
            ObjectLocation::new("inputs", "u-1/sample.vcf"),
            1_700_000_000,
        );
        let id = job.job_id;
        let result = ObjectLocation::new("results", format!("results/u-1/{id}~sample.annot.vcf"));
        f.jobs.put(job).unwrap();
        f.jobs
            .conditional_update(id, JobStatus::Pending, JobUpdate::Start)
            .unwrap();
        f.jobs
            .conditional_update(
                id,
                JobStatus::Running,
                JobUpdate::Complete(Completion {
                    result_file: result.clone(),
                    log_file: ObjectLocation::new("results", "log"),
                    complete_time: 1_700_000_100,
                }),
            )
            .unwrap();
        f.hot.put(&result, b"annotated".to_vec()).unwrap();

        let msg = ArchiveCandidate {
            job_id: id,
            result_key: result.key.clone(),
            user_id: user,
        };
        (msg, result)
    }

    #[test]
    fn free_user_result_moves_to_cold_tier() {
        let f = fixture();
        let (msg, result) = completed_job(&f, Role::FreeUser);

        assert_eq!(f.archiver.handle(msg.clone()), Outcome::Handled);

        let job = f.jobs.get(msg.job_id).unwrap().unwrap();
        let archive_id = job.archive_id.expect("archive id recorded");
        assert!(f.cold.contains(&archive_id));
        assert!(!f.hot.exists(&result).unwrap());
    }

    #[test]
    fn premium_user_result_stays_hot() {
        let f = fixture();
        let (msg, result) = completed_job(&f, Role::PremiumUser);

        assert_eq!(f.archiver.handle(msg.clone()), Outcome::Skip);
        assert!(f.hot.exists(&result).unwrap());
        assert!(!f.jobs.get(msg.job_id).unwrap().unwrap().is_archived());
        assert_eq!(f.cold.archive_count(), 0);
    }

    #[test]
    fn redelivery_after_archiving_is_a_noop() {
        let f = fixture();
        let (msg, _) = completed_job(&f, Role::FreeUser);
        assert_eq!(f.archiver.handle(msg.clone()), Outcome::Handled);
        assert_eq!(f.archiver.handle(msg.clone()), Outcome::Handled);
        assert_eq!(f.cold.archive_count(), 1);
    }

    #[test]
    fn crash_before_hot_delete_converges() {
        let f = fixture();
        let (msg, result) = completed_job(&f, Role::FreeUser);
        // Simulate: archive uploaded and recorded, hot copy still present.
        let archive_id = f.cold.upload_archive(b"annotated".to_vec(), "").unwrap();
        f.jobs
            .set_archive_id(msg.job_id, None, Some(&archive_id))
            .unwrap();

        assert_eq!(f.archiver.handle(msg), Outcome::Handled);
        assert!(!f.hot.exists(&result).unwrap());
        assert_eq!(f.cold.archive_count(), 1);
    }

    #[test]
    fn unknown_profile_is_retried() {
        let f = fixture();
        let (mut msg, result) = completed_job(&f, Role::FreeUser);
        msg.user_id = UserId::new("stranger").unwrap();

        assert_eq!(f.archiver.handle(msg), Outcome::Retry);
        assert!(f.hot.exists(&result).unwrap());
    }

    #[test]
    fn running_job_is_not_archived_yet() {
        let f = fixture();
        let user = UserId::new("u-1").unwrap();
        f.profiles.set_role(user.clone(), Role::FreeUser);
        let job = JobRecord::pending(
            JobId::new(),
            user.clone(),
            "u@example.com",
            "sample.vcf",
            ObjectLocation::new("inputs", "k"),
            0,
        );
        let msg = ArchiveCandidate {
            job_id: job.job_id,
            result_key: "results/u-1/x".into(),
            user_id: user,
        };
        f.jobs.put(job).unwrap();

        assert_eq!(f.archiver.handle(msg), Outcome::Retry);
        assert_eq!(f.cold.archive_count(), 0);
    }
}
