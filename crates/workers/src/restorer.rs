//! Restore Initiator: starts cold-tier retrievals for an owner's archived results.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use strata_core::{JobRecord, UserId};
use strata_events::{BusError, NotificationBus, PublishExt, RestoreRequest, ThawTracking};
use strata_infra::{ColdTier, ColdTierError, JobTable, JobTableError, RetrievalTier};

use crate::outcome::Outcome;
use crate::poll::MessageHandler;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Table(#[from] JobTableError),

    #[error(transparent)]
    ColdTier(#[from] ColdTierError),

    #[error("failed to publish thaw tracking: {0}")]
    Publish(#[from] BusError),

    #[error("job {0} has no result location to restore into")]
    NoResultLocation(strata_core::JobId),
}

/// Summary of one restore request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Retrievals started at the expedited tier.
    pub expedited: usize,
    /// Retrievals that fell back to the standard tier.
    pub standard: usize,
    /// Archived jobs whose archive was already gone.
    pub missing: usize,
    /// Archived jobs whose retrieval could not be started or announced.
    pub failed: usize,
}

impl RestoreSummary {
    pub fn initiated(&self) -> usize {
        self.expedited + self.standard
    }
}

/// Requests retrieval of every archived result an owner has.
///
/// Expedited retrieval is tried first; when the cold tier has no expedited
/// capacity the standard tier is used instead. Each started retrieval is
/// announced on the thaw topic so the thaw poller can finish it.
pub struct RestoreInitiator {
    jobs: Arc<dyn JobTable>,
    cold: Arc<dyn ColdTier>,
    bus: Arc<dyn NotificationBus>,
    thaw_topic: String,
}

impl RestoreInitiator {
    pub fn new(
        jobs: Arc<dyn JobTable>,
        cold: Arc<dyn ColdTier>,
        bus: Arc<dyn NotificationBus>,
        thaw_topic: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            cold,
            bus,
            thaw_topic: thaw_topic.into(),
        }
    }

    /// Attempt every archived job of `user_id`. A failure on one job is
    /// logged and counted; the remaining jobs are still attempted.
    pub fn restore(&self, user_id: &UserId) -> Result<RestoreSummary, RestoreError> {
        let mut summary = RestoreSummary::default();

        for job in self.jobs.query_by_owner(user_id)? {
            if !job.is_archived() {
                continue;
            }
            match self.restore_job(&job) {
                Ok(Some(RetrievalTier::Expedited)) => summary.expedited += 1,
                Ok(Some(RetrievalTier::Standard)) => summary.standard += 1,
                Ok(None) => summary.missing += 1,
                Err(e) => {
                    error!(job_id = %job.job_id, error = %e, "failed to start retrieval");
                    summary.failed += 1;
                }
            }
        }

        info!(
            user_id = %user_id,
            expedited = summary.expedited,
            standard = summary.standard,
            missing = summary.missing,
            failed = summary.failed,
            "restore initiated"
        );
        Ok(summary)
    }

    /// Start one retrieval; `None` when the archive no longer exists.
    fn restore_job(&self, job: &JobRecord) -> Result<Option<RetrievalTier>, RestoreError> {
        let Some(archive_id) = &job.archive_id else {
            return Ok(None);
        };
        let result_key = job
            .result_file
            .as_ref()
            .map(|loc| loc.key.clone())
            .ok_or(RestoreError::NoResultLocation(job.job_id))?;

        let (retrieval_job_id, tier) =
            match self.cold.initiate_retrieval(archive_id, RetrievalTier::Expedited) {
                Ok(id) => (id, RetrievalTier::Expedited),
                Err(ColdTierError::InsufficientCapacity(_)) => {
                    debug!(job_id = %job.job_id, "no expedited capacity, using standard tier");
                    let id = self
                        .cold
                        .initiate_retrieval(archive_id, RetrievalTier::Standard)?;
                    (id, RetrievalTier::Standard)
                }
                Err(ColdTierError::ArchiveNotFound(_)) => {
                    warn!(job_id = %job.job_id, archive_id = %archive_id, "archive already gone");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

        let tracking = ThawTracking {
            retrieval_job_id,
            archive_id: archive_id.clone(),
            result_key,
            job_id: job.job_id,
        };
        self.bus.publish_message(&self.thaw_topic, &tracking)?;
        debug!(
            job_id = %job.job_id,
            retrieval_job_id = %tracking.retrieval_job_id,
            %tier,
            "retrieval started"
        );
        Ok(Some(tier))
    }
}

impl MessageHandler for RestoreInitiator {
    type Message = RestoreRequest;

    fn handle(&self, msg: RestoreRequest) -> Outcome {
        match self.restore(&msg.user_id) {
            Ok(summary) if summary.failed > 0 => {
                warn!(user_id = %msg.user_id, failed = summary.failed, "restore left for retry");
                Outcome::Retry
            }
            Ok(_) => Outcome::Handled,
            Err(e) => {
                error!(user_id = %msg.user_id, error = %e, "restore failed");
                Outcome::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use strata_core::{ArchiveId, Completion, JobId, JobStatus, JobUpdate, ObjectLocation, RetrievalJobId};
    use strata_events::InMemoryNotificationBus;
    use strata_infra::{InMemoryColdTier, InMemoryJobTable, RetrievalStatus};

    use super::*;

    const THAW: &str = "thaw-requests";

    struct Fixture {
        jobs: Arc<InMemoryJobTable>,
        cold: Arc<InMemoryColdTier>,
        bus: Arc<InMemoryNotificationBus>,
        restorer: RestoreInitiator,
    }

    fn fixture() -> Fixture {
        let jobs = Arc::new(InMemoryJobTable::new());
        let cold = Arc::new(InMemoryColdTier::new());
        let bus = Arc::new(InMemoryNotificationBus::new());
        let restorer = RestoreInitiator::new(jobs.clone(), cold.clone(), bus.clone(), THAW);
        Fixture {
            jobs,
            cold,
            bus,
            restorer,
        }
    }

    fn user() -> UserId {
        UserId::new("u-1").unwrap()
    }

    /// A COMPLETED job for `user()`, archived when `archived` is set.
    fn completed(f: &Fixture, archived: bool) -> JobId {
        let job = JobRecord::pending(
            JobId::new(),
            user(),
            "u@example.com",
            "sample.vcf",
            ObjectLocation::new("inputs", "k"),
            0,
        );
        let id = job.job_id;
        f.jobs.put(job).unwrap();
        f.jobs
            .conditional_update(id, JobStatus::Pending, JobUpdate::Start)
            .unwrap();
        f.jobs
            .conditional_update(
                id,
                JobStatus::Running,
                JobUpdate::Complete(Completion {
                    result_file: ObjectLocation::new("results", format!("results/u-1/{id}~r")),
                    log_file: ObjectLocation::new("results", "log"),
                    complete_time: 10,
                }),
            )
            .unwrap();
        if archived {
            let archive = f.cold.upload_archive(b"r".to_vec(), "").unwrap();
            f.jobs.set_archive_id(id, None, Some(&archive)).unwrap();
        }
        id
    }

    #[test]
    fn only_archived_jobs_are_retrieved() {
        let f = fixture();
        let archived = completed(&f, true);
        completed(&f, false);

        let summary = f.restorer.restore(&user()).unwrap();
        assert_eq!(summary.expedited, 1);
        assert_eq!(summary.initiated(), 1);

        let published = f.bus.published(THAW);
        assert_eq!(published.len(), 1);
        let tracking: ThawTracking = published[0].decode().unwrap();
        assert_eq!(tracking.job_id, archived);
        assert_eq!(tracking.result_key, format!("results/u-1/{archived}~r"));
    }

    #[test]
    fn falls_back_to_standard_tier() {
        let f = fixture();
        completed(&f, true);
        f.cold.set_expedited_capacity(false);

        let summary = f.restorer.restore(&user()).unwrap();
        assert_eq!(summary.standard, 1);
        assert_eq!(summary.expedited, 0);
        assert_eq!(f.cold.retrievals()[0].1, RetrievalTier::Standard);
    }

    #[test]
    fn vanished_archive_is_not_an_error() {
        let f = fixture();
        let id = completed(&f, true);
        let archive = f.jobs.get(id).unwrap().unwrap().archive_id.unwrap();
        f.cold.delete_archive(&archive).unwrap();

        let summary = f.restorer.restore(&user()).unwrap();
        assert_eq!(summary.missing, 1);
        assert!(f.bus.published(THAW).is_empty());
    }

    #[test]
    fn owner_without_archives_is_handled() {
        let f = fixture();
        let msg = RestoreRequest { user_id: user() };
        assert_eq!(f.restorer.handle(msg), Outcome::Handled);
        assert!(f.cold.retrievals().is_empty());
    }

    #[test]
    fn publish_failure_is_retried() {
        let f = fixture();
        completed(&f, true);
        f.bus.set_failing(true);

        assert_eq!(f.restorer.handle(RestoreRequest { user_id: user() }), Outcome::Retry);
    }

    /// Refuses retrievals for one archive, delegating everything else.
    struct FlakyColdTier {
        inner: InMemoryColdTier,
        broken: Mutex<Option<ArchiveId>>,
    }

    impl ColdTier for FlakyColdTier {
        fn upload_archive(&self, bytes: Vec<u8>, description: &str) -> Result<ArchiveId, ColdTierError> {
            self.inner.upload_archive(bytes, description)
        }

        fn initiate_retrieval(
            &self,
            archive_id: &ArchiveId,
            tier: RetrievalTier,
        ) -> Result<RetrievalJobId, ColdTierError> {
            if self.broken.lock().unwrap().as_ref() == Some(archive_id) {
                return Err(ColdTierError::Service("vault unavailable".into()));
            }
            self.inner.initiate_retrieval(archive_id, tier)
        }

        fn retrieval_status(&self, job_id: &RetrievalJobId) -> Result<RetrievalStatus, ColdTierError> {
            self.inner.retrieval_status(job_id)
        }

        fn retrieval_output(&self, job_id: &RetrievalJobId) -> Result<Vec<u8>, ColdTierError> {
            self.inner.retrieval_output(job_id)
        }

        fn delete_archive(&self, archive_id: &ArchiveId) -> Result<(), ColdTierError> {
            self.inner.delete_archive(archive_id)
        }
    }

    #[test]
    fn one_failing_retrieval_does_not_stop_the_others() {
        let jobs = Arc::new(InMemoryJobTable::new());
        let cold = Arc::new(FlakyColdTier {
            inner: InMemoryColdTier::new(),
            broken: Mutex::new(None),
        });
        let bus = Arc::new(InMemoryNotificationBus::new());
        let restorer = RestoreInitiator::new(jobs.clone(), cold.clone(), bus.clone(), THAW);

        let mut archives = Vec::new();
        for _ in 0..3 {
            let job = JobRecord::pending(
                JobId::new(),
                user(),
                "u@example.com",
                "sample.vcf",
                ObjectLocation::new("inputs", "k"),
                0,
            );
            let id = job.job_id;
            jobs.put(job).unwrap();
            jobs.conditional_update(id, JobStatus::Pending, JobUpdate::Start)
                .unwrap();
            jobs.conditional_update(
                id,
                JobStatus::Running,
                JobUpdate::Complete(Completion {
                    result_file: ObjectLocation::new("results", format!("results/u-1/{id}~r")),
                    log_file: ObjectLocation::new("results", "log"),
                    complete_time: 10,
                }),
            )
            .unwrap();
            let archive = cold.upload_archive(b"r".to_vec(), "").unwrap();
            jobs.set_archive_id(id, None, Some(&archive)).unwrap();
            archives.push(archive);
        }
        *cold.broken.lock().unwrap() = Some(archives[1].clone());

        let summary = restorer.restore(&user()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.initiated(), 2);
        assert_eq!(bus.published(THAW).len(), 2);

        assert_eq!(
            restorer.handle(RestoreRequest { user_id: user() }),
            Outcome::Retry
        );
    }
}
