//! Glacier-backed cold tier.

use aws_sdk_glacier::Client;
use aws_sdk_glacier::primitives::ByteStream;
use aws_sdk_glacier::types::{JobParameters, StatusCode};
use tracing::instrument;

use strata_core::{ArchiveId, RetrievalJobId};

use super::{ColdTier, ColdTierError, RetrievalStatus, RetrievalTier};
use crate::aws::load_sdk_config;
use crate::runtime::BlockingRuntime;

/// The account that owns the credentials in use.
const CURRENT_ACCOUNT: &str = "-";

#[derive(Debug, Clone)]
pub struct GlacierColdTier {
    client: Client,
    vault_name: String,
    runtime: BlockingRuntime,
}

impl GlacierColdTier {
    pub fn new(client: Client, vault_name: impl Into<String>, runtime: BlockingRuntime) -> Self {
        Self {
            client,
            vault_name: vault_name.into(),
            runtime,
        }
    }

    pub fn from_env(vault_name: impl Into<String>, region: Option<&str>) -> Result<Self, ColdTierError> {
        let runtime = BlockingRuntime::new("strata-glacier")
            .map_err(|e| ColdTierError::Service(format!("failed to start runtime: {e}")))?;
        let config = load_sdk_config(&runtime, region);
        Ok(Self::new(Client::new(&config), vault_name, runtime))
    }
}

fn service<E: std::fmt::Display>(operation: &str) -> impl FnOnce(E) -> ColdTierError + '_ {
    move |e| ColdTierError::Service(format!("{operation} failed: {e}"))
}

impl ColdTier for GlacierColdTier {
    #[instrument(skip(self, bytes), fields(vault = %self.vault_name, size = bytes.len()), err)]
    fn upload_archive(
        &self,
        bytes: Vec<u8>,
        description: &str,
    ) -> Result<ArchiveId, ColdTierError> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .upload_archive()
                    .account_id(CURRENT_ACCOUNT)
                    .vault_name(&self.vault_name)
                    .archive_description(description)
                    .body(ByteStream::from(bytes))
                    .send(),
            )
            .map_err(service("UploadArchive"))?;

        let archive_id = output
            .archive_id()
            .ok_or_else(|| ColdTierError::Service("UploadArchive returned no archive id".into()))?;
        ArchiveId::new(archive_id).map_err(service("UploadArchive"))
    }

    #[instrument(skip(self), fields(vault = %self.vault_name, archive_id = %archive_id, tier = %tier), err)]
    fn initiate_retrieval(
        &self,
        archive_id: &ArchiveId,
        tier: RetrievalTier,
    ) -> Result<RetrievalJobId, ColdTierError> {
        let params = JobParameters::builder()
            .r#type("archive-retrieval")
            .archive_id(archive_id.as_str())
            .tier(tier.as_str())
            .build();

        let result = self.runtime.block_on(
            self.client
                .initiate_job()
                .account_id(CURRENT_ACCOUNT)
                .vault_name(&self.vault_name)
                .job_parameters(params)
                .send(),
        );

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                return Err(match err.as_service_error() {
                    Some(e) if e.is_insufficient_capacity_exception() => {
                        ColdTierError::InsufficientCapacity(tier)
                    }
                    Some(e) if e.is_resource_not_found_exception() => {
                        ColdTierError::ArchiveNotFound(archive_id.clone())
                    }
                    _ => ColdTierError::Service(format!("InitiateJob failed: {err}")),
                });
            }
        };

        let job_id = output
            .job_id()
            .ok_or_else(|| ColdTierError::Service("InitiateJob returned no job id".into()))?;
        RetrievalJobId::new(job_id).map_err(service("InitiateJob"))
    }

    #[instrument(skip(self), fields(vault = %self.vault_name, retrieval_job_id = %job_id), err)]
    fn retrieval_status(&self, job_id: &RetrievalJobId) -> Result<RetrievalStatus, ColdTierError> {
        let result = self.runtime.block_on(
            self.client
                .describe_job()
                .account_id(CURRENT_ACCOUNT)
                .vault_name(&self.vault_name)
                .job_id(job_id.as_str())
                .send(),
        );

        let output = match result {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_resource_not_found_exception()) => {
                return Err(ColdTierError::RetrievalNotFound(job_id.clone()));
            }
            Err(err) => return Err(ColdTierError::Service(format!("DescribeJob failed: {err}"))),
        };

        match output.status_code() {
            Some(StatusCode::Succeeded) => Ok(RetrievalStatus::Succeeded),
            Some(StatusCode::Failed) => Ok(RetrievalStatus::Failed),
            Some(StatusCode::InProgress) => Ok(RetrievalStatus::InProgress),
            other => Err(ColdTierError::Service(format!(
                "DescribeJob returned unexpected status {other:?}"
            ))),
        }
    }

    #[instrument(skip(self), fields(vault = %self.vault_name, retrieval_job_id = %job_id), err)]
    fn retrieval_output(&self, job_id: &RetrievalJobId) -> Result<Vec<u8>, ColdTierError> {
        self.runtime.block_on(async {
            let output = self
                .client
                .get_job_output()
                .account_id(CURRENT_ACCOUNT)
                .vault_name(&self.vault_name)
                .job_id(job_id.as_str())
                .send()
                .await
                .map_err(|err| match err.as_service_error() {
                    Some(e) if e.is_resource_not_found_exception() => {
                        ColdTierError::RetrievalNotFound(job_id.clone())
                    }
                    _ => ColdTierError::Service(format!("GetJobOutput failed: {err}")),
                })?;

            let bytes = output
                .body
                .collect()
                .await
                .map_err(service("reading job output"))?;
            Ok(bytes.into_bytes().to_vec())
        })
    }

    #[instrument(skip(self), fields(vault = %self.vault_name, archive_id = %archive_id), err)]
    fn delete_archive(&self, archive_id: &ArchiveId) -> Result<(), ColdTierError> {
        let result = self.runtime.block_on(
            self.client
                .delete_archive()
                .account_id(CURRENT_ACCOUNT)
                .vault_name(&self.vault_name)
                .archive_id(archive_id.as_str())
                .send(),
        );

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_resource_not_found_exception()) => {
                Ok(())
            }
            Err(err) => Err(ColdTierError::Service(format!("DeleteArchive failed: {err}"))),
        }
    }
}
