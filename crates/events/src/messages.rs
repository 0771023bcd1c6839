//! Application payloads carried inside a [`DeliveryEnvelope`](crate::DeliveryEnvelope).
//!
//! Field names on the wire are fixed by the producers and consumers outside
//! this repository (upload front-end, notification mailer), hence the renames.

use serde::{Deserialize, Serialize};

use strata_core::{ArchiveId, JobId, JobRecord, JobStatus, ObjectLocation, RetrievalJobId, UserId};

/// A newly submitted job, consumed by the Dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMessage {
    pub job_id: JobId,
    pub input_file_name: String,
    #[serde(rename = "s3_inputs_bucket")]
    pub input_bucket: String,
    #[serde(rename = "s3_key_input_file")]
    pub input_key: String,
    pub user_id: UserId,
    pub user_email: String,
}

impl SubmissionMessage {
    pub fn for_job(job: &JobRecord) -> Self {
        Self {
            job_id: job.job_id,
            input_file_name: job.input_file_name.clone(),
            input_bucket: job.input_file.bucket.clone(),
            input_key: job.input_file.key.clone(),
            user_id: job.user_id.clone(),
            user_email: job.user_email.clone(),
        }
    }

    pub fn input_location(&self) -> ObjectLocation {
        ObjectLocation::new(&self.input_bucket, &self.input_key)
    }
}

/// Published by the Finisher once a job is COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub job_id: JobId,
    pub user_id: UserId,
    pub input_file_name: String,
    pub complete_time: i64,
    pub job_status: JobStatus,
    #[serde(rename = "results_file_location")]
    pub result_key: String,
    pub user_email: String,
}

/// The slice of a [`CompletionMessage`] the Archiver needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCandidate {
    pub job_id: JobId,
    #[serde(rename = "results_file_location")]
    pub result_key: String,
    pub user_id: UserId,
}

/// Ask for every archived result of an owner to be brought back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub user_id: UserId,
}

/// Correlates an in-flight cold-tier retrieval with the job it restores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThawTracking {
    #[serde(rename = "glacier_retrieval_job_id")]
    pub retrieval_job_id: RetrievalJobId,
    pub archive_id: ArchiveId,
    #[serde(rename = "s3_results_key_name")]
    pub result_key: String,
    #[serde(rename = "annotation_job_id")]
    pub job_id: JobId,
}
