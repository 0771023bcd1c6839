use std::sync::Arc;

use thiserror::Error;

use strata_core::{ArchiveId, DomainError, JobId, JobRecord, JobStatus, JobUpdate, UserId};

/// Result of a compare-and-swap write.
///
/// A failed condition is an expected outcome (another worker got there first,
/// or a stale message arrived), so it is reported as a value rather than an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalWrite {
    /// The stored value matched and every new field was written.
    Applied,
    /// The stored value did not match (or the job does not exist); nothing
    /// was written.
    Rejected,
}

impl ConditionalWrite {
    pub fn applied(&self) -> bool {
        matches!(self, ConditionalWrite::Applied)
    }
}

#[derive(Debug, Error)]
pub enum JobTableError {
    #[error("job already exists: {0}")]
    DuplicateKey(JobId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable key-value store of job records.
///
/// ## Concurrency
///
/// [`JobTable::conditional_update`] and [`JobTable::set_archive_id`] are the
/// only concurrency-control primitives in the engine. Each must be a single
/// atomic operation at the storage layer: the expected-value check and the
/// write happen together, never as read-modify-write from the caller.
///
/// Every writer role owns a disjoint set of transitions:
///
/// | Role | Transition |
/// |------|------------|
/// | Dispatcher | status PENDING → RUNNING |
/// | Finisher | status RUNNING → COMPLETED |
/// | Archiver | archive id empty → set |
/// | Thaw Poller | archive id set → empty |
pub trait JobTable: Send + Sync {
    /// Point lookup.
    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobTableError>;

    /// Every job owned by `user_id`. Order is unspecified.
    fn query_by_owner(&self, user_id: &UserId) -> Result<Vec<JobRecord>, JobTableError>;

    /// Create a new record; fails with [`JobTableError::DuplicateKey`] if the
    /// id is taken.
    fn put(&self, record: JobRecord) -> Result<(), JobTableError>;

    /// Write `update` only if the stored status equals `expected`.
    ///
    /// Updates that are not a single forward step from `expected` are
    /// rejected with [`DomainError::InvalidTransition`] before touching
    /// storage.
    fn conditional_update(
        &self,
        job_id: JobId,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<ConditionalWrite, JobTableError>;

    /// Swap the archive id only if the stored one equals `expected`
    /// (`None` meaning "not archived").
    ///
    /// Setting a non-empty archive id additionally requires the job to be
    /// COMPLETED.
    fn set_archive_id(
        &self,
        job_id: JobId,
        expected: Option<&ArchiveId>,
        new: Option<&ArchiveId>,
    ) -> Result<ConditionalWrite, JobTableError>;
}

impl<T> JobTable for Arc<T>
where
    T: JobTable + ?Sized,
{
    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobTableError> {
        (**self).get(job_id)
    }

    fn query_by_owner(&self, user_id: &UserId) -> Result<Vec<JobRecord>, JobTableError> {
        (**self).query_by_owner(user_id)
    }

    fn put(&self, record: JobRecord) -> Result<(), JobTableError> {
        (**self).put(record)
    }

    fn conditional_update(
        &self,
        job_id: JobId,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<ConditionalWrite, JobTableError> {
        (**self).conditional_update(job_id, expected, update)
    }

    fn set_archive_id(
        &self,
        job_id: JobId,
        expected: Option<&ArchiveId>,
        new: Option<&ArchiveId>,
    ) -> Result<ConditionalWrite, JobTableError> {
        (**self).set_archive_id(job_id, expected, new)
    }
}
