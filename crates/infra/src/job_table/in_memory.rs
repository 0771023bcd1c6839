//! In-memory job table for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use strata_core::{ArchiveId, DomainError, JobId, JobRecord, JobStatus, JobUpdate, UserId};

use super::r#trait::{ConditionalWrite, JobTable, JobTableError};

/// Job table backed by a `HashMap` behind one lock.
///
/// Every conditional write holds the write lock across check and update, so
/// it has the same atomicity a storage-level conditional write would.
#[derive(Debug, Default)]
pub struct InMemoryJobTable {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> JobTableError {
    JobTableError::Storage("job table lock poisoned".to_string())
}

impl JobTable for InMemoryJobTable {
    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobTableError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&job_id).cloned())
    }

    fn query_by_owner(&self, user_id: &UserId) -> Result<Vec<JobRecord>, JobTableError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs
            .values()
            .filter(|j| &j.user_id == user_id)
            .cloned()
            .collect())
    }

    fn put(&self, record: JobRecord) -> Result<(), JobTableError> {
        record.validate()?;
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&record.job_id) {
            return Err(JobTableError::DuplicateKey(record.job_id));
        }
        jobs.insert(record.job_id, record);
        Ok(())
    }

    fn conditional_update(
        &self,
        job_id: JobId,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<ConditionalWrite, JobTableError> {
        update.validate_from(expected)?;

        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(ConditionalWrite::Rejected);
        };
        if job.status != expected {
            return Ok(ConditionalWrite::Rejected);
        }

        update.apply(job);
        Ok(ConditionalWrite::Applied)
    }

    fn set_archive_id(
        &self,
        job_id: JobId,
        expected: Option<&ArchiveId>,
        new: Option<&ArchiveId>,
    ) -> Result<ConditionalWrite, JobTableError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(ConditionalWrite::Rejected);
        };
        if job.archive_id.as_ref() != expected {
            return Ok(ConditionalWrite::Rejected);
        }
        if new.is_some() && job.status != JobStatus::Completed {
            return Err(DomainError::invariant(format!(
                "cannot archive job {job_id} while {}",
                job.status
            ))
            .into());
        }

        job.archive_id = new.cloned();
        Ok(ConditionalWrite::Applied)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use strata_core::{Completion, ObjectLocation};

    use super::*;

    fn pending(user: &str) -> JobRecord {
        JobRecord::pending(
            JobId::new(),
            UserId::new(user).unwrap(),
            "user@example.com",
            "sample.vcf",
            ObjectLocation::new("inputs", format!("{user}/sample.vcf")),
            1_700_000_000,
        )
    }

    fn completion() -> Completion {
        Completion {
            result_file: ObjectLocation::new("results", "results/u/x~sample.annot.vcf"),
            log_file: ObjectLocation::new("results", "results/u/x~sample.vcf.count.log"),
            complete_time: 1_700_000_050,
        }
    }

    #[test]
    fn put_rejects_duplicate_ids() {
        let table = InMemoryJobTable::new();
        let job = pending("u-1");
        table.put(job.clone()).unwrap();
        assert!(matches!(
            table.put(job.clone()),
            Err(JobTableError::DuplicateKey(id)) if id == job.job_id
        ));
    }

    #[test]
    fn get_missing_is_none() {
        let table = InMemoryJobTable::new();
        assert!(table.get(JobId::new()).unwrap().is_none());
    }

    #[test]
    fn query_by_owner_filters() {
        let table = InMemoryJobTable::new();
        table.put(pending("u-1")).unwrap();
        table.put(pending("u-1")).unwrap();
        table.put(pending("u-2")).unwrap();

        let jobs = table.query_by_owner(&UserId::new("u-1").unwrap()).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(table
            .query_by_owner(&UserId::new("nobody").unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn conditional_update_only_applies_on_expected_status() {
        let table = InMemoryJobTable::new();
        let job = pending("u-1");
        let id = job.job_id;
        table.put(job).unwrap();

        assert_eq!(
            table
                .conditional_update(id, JobStatus::Pending, JobUpdate::Start)
                .unwrap(),
            ConditionalWrite::Applied
        );
        assert_eq!(
            table
                .conditional_update(id, JobStatus::Pending, JobUpdate::Start)
                .unwrap(),
            ConditionalWrite::Rejected
        );

        table
            .conditional_update(id, JobStatus::Running, JobUpdate::Complete(completion()))
            .unwrap();
        let stored = table.get(id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.complete_time, Some(1_700_000_050));
        assert!(stored.log_file.is_some());
    }

    #[test]
    fn conditional_update_on_missing_job_is_rejected() {
        let table = InMemoryJobTable::new();
        assert_eq!(
            table
                .conditional_update(JobId::new(), JobStatus::Pending, JobUpdate::Start)
                .unwrap(),
            ConditionalWrite::Rejected
        );
    }

    #[test]
    fn skipping_a_status_is_an_error() {
        let table = InMemoryJobTable::new();
        let job = pending("u-1");
        let id = job.job_id;
        table.put(job).unwrap();

        let err = table
            .conditional_update(id, JobStatus::Pending, JobUpdate::Complete(completion()))
            .unwrap_err();
        assert!(matches!(
            err,
            JobTableError::Domain(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(table.get(id).unwrap().unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn archive_id_requires_completed_job() {
        let table = InMemoryJobTable::new();
        let job = pending("u-1");
        let id = job.job_id;
        table.put(job).unwrap();

        let archive = ArchiveId::new("a-1").unwrap();
        assert!(table.set_archive_id(id, None, Some(&archive)).is_err());
    }

    #[test]
    fn archive_id_swap_is_conditional() {
        let table = InMemoryJobTable::new();
        let job = pending("u-1");
        let id = job.job_id;
        table.put(job).unwrap();
        table
            .conditional_update(id, JobStatus::Pending, JobUpdate::Start)
            .unwrap();
        table
            .conditional_update(id, JobStatus::Running, JobUpdate::Complete(completion()))
            .unwrap();

        let a1 = ArchiveId::new("a-1").unwrap();
        let a2 = ArchiveId::new("a-2").unwrap();
        assert!(table.set_archive_id(id, None, Some(&a1)).unwrap().applied());
        // A second archiver that lost the race sees its write rejected.
        assert!(!table.set_archive_id(id, None, Some(&a2)).unwrap().applied());
        assert_eq!(table.get(id).unwrap().unwrap().archive_id, Some(a1.clone()));

        // Clearing with a stale id is rejected; with the current one it applies.
        assert!(!table.set_archive_id(id, Some(&a2), None).unwrap().applied());
        assert!(table.set_archive_id(id, Some(&a1), None).unwrap().applied());
        assert!(!table.get(id).unwrap().unwrap().is_archived());
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let table = InMemoryJobTable::arc();
        let job = pending("u-1");
        let id = job.job_id;
        table.put(job).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    table
                        .conditional_update(id, JobStatus::Pending, JobUpdate::Start)
                        .unwrap()
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(ConditionalWrite::applied)
            .count();
        assert_eq!(applied, 1);
    }
}
