//! Cold archive tier: cheap storage with asynchronous, tiered retrieval.
//!
//! One blob per archived result, addressed by an opaque [`ArchiveId`].
//! Reading a blob back is a two-step affair: initiate a retrieval job, poll
//! it until it succeeds, then fetch its output.

pub mod in_memory;
#[cfg(feature = "aws")]
pub mod glacier;

use std::sync::Arc;

use thiserror::Error;

use strata_core::{ArchiveId, RetrievalJobId};

pub use in_memory::InMemoryColdTier;
#[cfg(feature = "aws")]
pub use glacier::GlacierColdTier;

/// Retrieval speed (and price) class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalTier {
    /// Minutes; subject to provisioned capacity.
    Expedited,
    /// Hours; always accepted.
    Standard,
}

impl RetrievalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalTier::Expedited => "Expedited",
            RetrievalTier::Standard => "Standard",
        }
    }
}

impl core::fmt::Display for RetrievalTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStatus {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Error)]
pub enum ColdTierError {
    /// The requested tier cannot take more retrievals right now.
    #[error("insufficient capacity for {0} retrieval")]
    InsufficientCapacity(RetrievalTier),

    #[error("archive not found: {0}")]
    ArchiveNotFound(ArchiveId),

    #[error("retrieval job not found: {0}")]
    RetrievalNotFound(RetrievalJobId),

    #[error("retrieval job {0} has no output yet")]
    OutputNotReady(RetrievalJobId),

    #[error("cold tier error: {0}")]
    Service(String),
}

pub trait ColdTier: Send + Sync {
    /// Store `bytes` as a new archive.
    fn upload_archive(&self, bytes: Vec<u8>, description: &str)
    -> Result<ArchiveId, ColdTierError>;

    /// Start an asynchronous retrieval of `archive_id` at `tier`.
    fn initiate_retrieval(
        &self,
        archive_id: &ArchiveId,
        tier: RetrievalTier,
    ) -> Result<RetrievalJobId, ColdTierError>;

    fn retrieval_status(&self, job_id: &RetrievalJobId) -> Result<RetrievalStatus, ColdTierError>;

    /// Bytes of a succeeded retrieval.
    fn retrieval_output(&self, job_id: &RetrievalJobId) -> Result<Vec<u8>, ColdTierError>;

    /// Remove an archive. Deleting an absent archive succeeds.
    fn delete_archive(&self, archive_id: &ArchiveId) -> Result<(), ColdTierError>;
}

impl<T> ColdTier for Arc<T>
where
    T: ColdTier + ?Sized,
{
    fn upload_archive(
        &self,
        bytes: Vec<u8>,
        description: &str,
    ) -> Result<ArchiveId, ColdTierError> {
        (**self).upload_archive(bytes, description)
    }

    fn initiate_retrieval(
        &self,
        archive_id: &ArchiveId,
        tier: RetrievalTier,
    ) -> Result<RetrievalJobId, ColdTierError> {
        (**self).initiate_retrieval(archive_id, tier)
    }

    fn retrieval_status(&self, job_id: &RetrievalJobId) -> Result<RetrievalStatus, ColdTierError> {
        (**self).retrieval_status(job_id)
    }

    fn retrieval_output(&self, job_id: &RetrievalJobId) -> Result<Vec<u8>, ColdTierError> {
        (**self).retrieval_output(job_id)
    }

    fn delete_archive(&self, archive_id: &ArchiveId) -> Result<(), ColdTierError> {
        (**self).delete_archive(archive_id)
    }
}
