//! `strata-core`: job lifecycle domain primitives.
//!
//! This crate contains the **pure domain** of the job engine (no IO): the job
//! record persisted in the job table, its forward-only status machine, storage
//! locations and owner entitlement.

pub mod error;
pub mod id;
pub mod job;
pub mod role;

pub use error::{DomainError, DomainResult};
pub use id::{ArchiveId, JobId, RetrievalJobId, UserId};
pub use job::{Completion, JobRecord, JobStatus, JobUpdate, ObjectLocation, epoch_seconds};
pub use role::Role;
