//! In-memory cold tier for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use strata_core::{ArchiveId, RetrievalJobId};

use super::{ColdTier, ColdTierError, RetrievalStatus, RetrievalTier};

#[derive(Debug, Clone)]
struct Retrieval {
    archive_id: ArchiveId,
    tier: RetrievalTier,
    status: RetrievalStatus,
    /// Snapshot taken at initiation; survives deletion of the archive.
    output: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    archives: HashMap<ArchiveId, Vec<u8>>,
    retrievals: HashMap<RetrievalJobId, Retrieval>,
}

/// Cold tier double.
///
/// Retrievals stay `InProgress` until the test completes or fails them.
/// Expedited capacity can be switched off to exercise tier fallback.
#[derive(Debug, Default)]
pub struct InMemoryColdTier {
    state: Mutex<State>,
    next_id: AtomicU64,
    expedited_unavailable: AtomicBool,
}

impl InMemoryColdTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_expedited_capacity(&self, available: bool) {
        self.expedited_unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn contains(&self, archive_id: &ArchiveId) -> bool {
        self.state
            .lock()
            .map(|s| s.archives.contains_key(archive_id))
            .unwrap_or(false)
    }

    pub fn archive_count(&self) -> usize {
        self.state.lock().map(|s| s.archives.len()).unwrap_or(0)
    }

    /// Retrievals initiated so far, as `(archive, tier)` pairs.
    pub fn retrievals(&self) -> Vec<(ArchiveId, RetrievalTier)> {
        self.state
            .lock()
            .map(|s| {
                s.retrievals
                    .values()
                    .map(|r| (r.archive_id.clone(), r.tier))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Finish every in-progress retrieval successfully.
    pub fn complete_all(&self) {
        self.settle_all(RetrievalStatus::Succeeded);
    }

    /// Fail every in-progress retrieval.
    pub fn fail_all(&self) {
        self.settle_all(RetrievalStatus::Failed);
    }

    fn settle_all(&self, status: RetrievalStatus) {
        if let Ok(mut state) = self.state.lock() {
            for r in state.retrievals.values_mut() {
                if r.status == RetrievalStatus::InProgress {
                    r.status = status;
                }
            }
        }
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }
}

fn poisoned() -> ColdTierError {
    ColdTierError::Service("cold tier lock poisoned".to_string())
}

fn id_error(e: strata_core::DomainError) -> ColdTierError {
    ColdTierError::Service(e.to_string())
}

impl ColdTier for InMemoryColdTier {
    fn upload_archive(
        &self,
        bytes: Vec<u8>,
        _description: &str,
    ) -> Result<ArchiveId, ColdTierError> {
        let archive_id = ArchiveId::new(self.next("archive")).map_err(id_error)?;
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.archives.insert(archive_id.clone(), bytes);
        Ok(archive_id)
    }

    fn initiate_retrieval(
        &self,
        archive_id: &ArchiveId,
        tier: RetrievalTier,
    ) -> Result<RetrievalJobId, ColdTierError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let Some(bytes) = state.archives.get(archive_id).cloned() else {
            return Err(ColdTierError::ArchiveNotFound(archive_id.clone()));
        };
        if tier == RetrievalTier::Expedited && self.expedited_unavailable.load(Ordering::SeqCst) {
            return Err(ColdTierError::InsufficientCapacity(tier));
        }

        let job_id = RetrievalJobId::new(self.next("retrieval")).map_err(id_error)?;
        state.retrievals.insert(
            job_id.clone(),
            Retrieval {
                archive_id: archive_id.clone(),
                tier,
                status: RetrievalStatus::InProgress,
                output: bytes,
            },
        );
        Ok(job_id)
    }

    fn retrieval_status(&self, job_id: &RetrievalJobId) -> Result<RetrievalStatus, ColdTierError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        state
            .retrievals
            .get(job_id)
            .map(|r| r.status)
            .ok_or_else(|| ColdTierError::RetrievalNotFound(job_id.clone()))
    }

    fn retrieval_output(&self, job_id: &RetrievalJobId) -> Result<Vec<u8>, ColdTierError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let retrieval = state
            .retrievals
            .get(job_id)
            .ok_or_else(|| ColdTierError::RetrievalNotFound(job_id.clone()))?;
        if retrieval.status != RetrievalStatus::Succeeded {
            return Err(ColdTierError::OutputNotReady(job_id.clone()));
        }
        Ok(retrieval.output.clone())
    }

    fn delete_archive(&self, archive_id: &ArchiveId) -> Result<(), ColdTierError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.archives.remove(archive_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_lifecycle() {
        let tier = InMemoryColdTier::new();
        let archive = tier.upload_archive(b"result".to_vec(), "job x").unwrap();
        assert!(tier.contains(&archive));

        let job = tier
            .initiate_retrieval(&archive, RetrievalTier::Expedited)
            .unwrap();
        assert_eq!(tier.retrieval_status(&job).unwrap(), RetrievalStatus::InProgress);
        assert!(matches!(
            tier.retrieval_output(&job),
            Err(ColdTierError::OutputNotReady(_))
        ));

        tier.complete_all();
        assert_eq!(tier.retrieval_status(&job).unwrap(), RetrievalStatus::Succeeded);
        assert_eq!(tier.retrieval_output(&job).unwrap(), b"result");
    }

    #[test]
    fn expedited_capacity_can_run_out() {
        let tier = InMemoryColdTier::new();
        let archive = tier.upload_archive(vec![1], "").unwrap();
        tier.set_expedited_capacity(false);

        assert!(matches!(
            tier.initiate_retrieval(&archive, RetrievalTier::Expedited),
            Err(ColdTierError::InsufficientCapacity(RetrievalTier::Expedited))
        ));
        tier.initiate_retrieval(&archive, RetrievalTier::Standard)
            .unwrap();
        assert_eq!(tier.retrievals(), vec![(archive, RetrievalTier::Standard)]);
    }

    #[test]
    fn deleted_archive_cannot_be_retrieved_but_delete_is_idempotent() {
        let tier = InMemoryColdTier::new();
        let archive = tier.upload_archive(vec![1], "").unwrap();
        tier.delete_archive(&archive).unwrap();
        tier.delete_archive(&archive).unwrap();

        assert!(matches!(
            tier.initiate_retrieval(&archive, RetrievalTier::Standard),
            Err(ColdTierError::ArchiveNotFound(_))
        ));
    }

    #[test]
    fn output_outlives_archive_deletion() {
        let tier = InMemoryColdTier::new();
        let archive = tier.upload_archive(b"keep".to_vec(), "").unwrap();
        let job = tier.initiate_retrieval(&archive, RetrievalTier::Standard).unwrap();
        tier.complete_all();
        tier.delete_archive(&archive).unwrap();
        assert_eq!(tier.retrieval_output(&job).unwrap(), b"keep");
    }

    #[test]
    fn unknown_retrieval_job() {
        let tier = InMemoryColdTier::new();
        let id = RetrievalJobId::new("nope").unwrap();
        assert!(matches!(
            tier.retrieval_status(&id),
            Err(ColdTierError::RetrievalNotFound(_))
        ));
    }
}
