//! `strata-workers`: the queue-driven participants of the job lifecycle.
//!
//! Each worker is a [`MessageHandler`] run by a [`QueueWorker`]:
//! - [`Dispatcher`]: PENDING → RUNNING, launches the runner
//! - [`Finisher`]: RUNNING → COMPLETED, called by the runner itself
//! - [`Archiver`]: moves free-tier results to the cold tier
//! - [`RestoreInitiator`] and [`ThawPoller`]: bring archived results back
//!
//! Every handler re-reads the job record before acting, so redelivered and
//! duplicated messages converge on the same state.

pub mod archiver;
pub mod deploy;
pub mod dispatcher;
pub mod finisher;
pub mod intake;
pub mod outcome;
pub mod poll;
pub mod restorer;
pub mod thaw;

pub use archiver::{ArchiveError, Archiver};
pub use deploy::{ARCHIVE_WAIT, DISPATCH_WAIT, Deployment, RESTORE_WAIT, THAW_WAIT};
pub use dispatcher::{DispatchError, Dispatcher};
pub use finisher::{FinishError, FinishRequest, Finisher, output_files};
pub use intake::{IntakeError, JobIntake, NewJob};
pub use outcome::Outcome;
pub use poll::{MessageHandler, Poll, QueueWorker, WorkerHandle, WorkerStats};
pub use restorer::{RestoreError, RestoreInitiator, RestoreSummary};
pub use thaw::{ThawError, ThawPoller};
