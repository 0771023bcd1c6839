//! Job intake: the front door that creates jobs and asks for restores.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use strata_core::{JobId, JobRecord, ObjectLocation, UserId, epoch_seconds};
use strata_events::{BusError, NotificationBus, PublishExt, RestoreRequest, SubmissionMessage};
use strata_infra::{JobTable, JobTableError};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Table(#[from] JobTableError),

    #[error("failed to publish: {0}")]
    Publish(#[from] BusError),
}

/// A job as submitted by its owner, input already uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub user_id: UserId,
    pub user_email: String,
    pub input_file_name: String,
    pub input_file: ObjectLocation,
}

pub struct JobIntake {
    jobs: Arc<dyn JobTable>,
    bus: Arc<dyn NotificationBus>,
    requests_topic: String,
    restore_topic: String,
}

impl JobIntake {
    pub fn new(
        jobs: Arc<dyn JobTable>,
        bus: Arc<dyn NotificationBus>,
        requests_topic: impl Into<String>,
        restore_topic: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            bus,
            requests_topic: requests_topic.into(),
            restore_topic: restore_topic.into(),
        }
    }

    /// Record a PENDING job and announce it to the dispatchers.
    pub fn submit(&self, job: NewJob) -> Result<JobRecord, IntakeError> {
        let record = JobRecord::pending(
            JobId::new(),
            job.user_id,
            job.user_email,
            job.input_file_name,
            job.input_file,
            epoch_seconds(),
        );
        self.jobs.put(record.clone())?;
        self.bus
            .publish_message(&self.requests_topic, &SubmissionMessage::for_job(&record))?;

        info!(job_id = %record.job_id, user_id = %record.user_id, "job submitted");
        Ok(record)
    }

    /// Ask for every archived result of `user_id` to be brought back, as
    /// happens when the owner upgrades to a premium plan.
    pub fn request_restore(&self, user_id: &UserId) -> Result<(), IntakeError> {
        let request = RestoreRequest {
            user_id: user_id.clone(),
        };
        self.bus.publish_message(&self.restore_topic, &request)?;
        info!(user_id = %user_id, "restore requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_core::JobStatus;
    use strata_events::InMemoryNotificationBus;
    use strata_infra::InMemoryJobTable;

    use super::*;

    fn intake() -> (Arc<InMemoryJobTable>, Arc<InMemoryNotificationBus>, JobIntake) {
        let jobs = Arc::new(InMemoryJobTable::new());
        let bus = Arc::new(InMemoryNotificationBus::new());
        let intake = JobIntake::new(jobs.clone(), bus.clone(), "job-requests", "restore-requests");
        (jobs, bus, intake)
    }

    #[test]
    fn submit_records_pending_job_and_announces_it() {
        let (jobs, bus, intake) = intake();
        let record = intake
            .submit(NewJob {
                user_id: UserId::new("u-1").unwrap(),
                user_email: "u@example.com".into(),
                input_file_name: "sample.vcf".into(),
                input_file: ObjectLocation::new("inputs", "u-1/sample.vcf"),
            })
            .unwrap();

        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(jobs.get(record.job_id).unwrap(), Some(record.clone()));

        let published = bus.published("job-requests");
        assert_eq!(published.len(), 1);
        let msg: SubmissionMessage = published[0].decode().unwrap();
        assert_eq!(msg, SubmissionMessage::for_job(&record));
    }

    #[test]
    fn restore_request_goes_to_restore_topic() {
        let (_, bus, intake) = intake();
        let user = UserId::new("u-1").unwrap();
        intake.request_restore(&user).unwrap();

        let published = bus.published("restore-requests");
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].decode::<RestoreRequest>().unwrap().user_id,
            user
        );
    }
}
