//! Job record and its forward-only status machine.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{ArchiveId, JobId, UserId};

/// Current wall-clock time in epoch seconds (the unit every timestamp on a
/// job record uses).
pub fn epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Lifecycle status of a job.
///
/// Transitions are strictly `PENDING → RUNNING → COMPLETED`; a status never
/// moves backwards and never skips a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
        }
    }

    /// The only status this one may advance to.
    pub fn successor(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::Running),
            JobStatus::Running => Some(JobStatus::Completed),
            JobStatus::Completed => None,
        }
    }

    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        self.successor() == Some(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed => 2,
        }
    }

    /// True if `self` is at or beyond `other` in the lifecycle.
    pub fn has_reached(&self, other: JobStatus) -> bool {
        self.rank() >= other.rank()
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// Bucket + key address of an object in the hot store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl core::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Fields recorded when a job reaches COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub result_file: ObjectLocation,
    pub log_file: ObjectLocation,
    /// Epoch seconds.
    pub complete_time: i64,
}

/// The new fields written by a status-gated conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    /// PENDING → RUNNING (Dispatcher).
    Start,
    /// RUNNING → COMPLETED with output locations (Finisher).
    Complete(Completion),
}

impl JobUpdate {
    pub fn target_status(&self) -> JobStatus {
        match self {
            JobUpdate::Start => JobStatus::Running,
            JobUpdate::Complete(_) => JobStatus::Completed,
        }
    }

    /// Reject updates that would not be a single forward step from `expected`.
    pub fn validate_from(&self, expected: JobStatus) -> DomainResult<()> {
        let to = self.target_status();
        if expected.can_advance_to(to) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition { from: expected, to })
        }
    }

    /// Write the update's fields onto a record. Callers gate this on the
    /// stored status first.
    pub fn apply(&self, record: &mut JobRecord) {
        record.status = self.target_status();
        if let JobUpdate::Complete(c) = self {
            record.result_file = Some(c.result_file.clone());
            record.log_file = Some(c.log_file.clone());
            record.complete_time = Some(c.complete_time);
        }
    }
}

/// One row of the job table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub user_id: UserId,
    pub user_email: String,
    pub input_file_name: String,
    pub input_file: ObjectLocation,
    pub status: JobStatus,
    /// Epoch seconds.
    pub submit_time: i64,
    /// Epoch seconds; set once COMPLETED.
    pub complete_time: Option<i64>,
    pub result_file: Option<ObjectLocation>,
    pub log_file: Option<ObjectLocation>,
    /// `Some` while the result lives in the cold tier.
    pub archive_id: Option<ArchiveId>,
}

impl JobRecord {
    /// A freshly submitted job.
    pub fn pending(
        job_id: JobId,
        user_id: UserId,
        user_email: impl Into<String>,
        input_file_name: impl Into<String>,
        input_file: ObjectLocation,
        submit_time: i64,
    ) -> Self {
        Self {
            job_id,
            user_id,
            user_email: user_email.into(),
            input_file_name: input_file_name.into(),
            input_file,
            status: JobStatus::Pending,
            submit_time,
            complete_time: None,
            result_file: None,
            log_file: None,
            archive_id: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archive_id.is_some()
    }

    /// Check the record-level invariants the table must never store a
    /// violation of.
    pub fn validate(&self) -> DomainResult<()> {
        if self.archive_id.is_some() && self.status != JobStatus::Completed {
            return Err(DomainError::invariant(format!(
                "job {} has an archive id while {}",
                self.job_id, self.status
            )));
        }
        if self.status == JobStatus::Completed
            && (self.result_file.is_none() || self.complete_time.is_none())
        {
            return Err(DomainError::invariant(format!(
                "job {} is COMPLETED without result location or completion time",
                self.job_id
            )));
        }
        if self.input_file_name.trim().is_empty() {
            return Err(DomainError::validation("input file name must not be empty"));
        }
        Ok(())
    }
}
