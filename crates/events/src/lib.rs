//! Message plumbing between workers.
//!
//! Workers never share in-process state: every hand-off is a message that a
//! [`NotificationBus`] fans out into one or more [`MessageQueue`]s. Both
//! contracts are at-least-once, so every consumer must be idempotent.

pub mod bus;
pub mod envelope;
pub mod in_memory_bus;
pub mod in_memory_queue;
pub mod messages;
pub mod queue;

pub use bus::{BusError, NotificationBus, PublishExt};
pub use envelope::{DeliveryEnvelope, EnvelopeError};
pub use in_memory_bus::InMemoryNotificationBus;
pub use in_memory_queue::InMemoryQueue;
pub use messages::{
    ArchiveCandidate, CompletionMessage, RestoreRequest, SubmissionMessage, ThawTracking,
};
pub use queue::{MessageQueue, QueueError, ReceiptHandle, ReceivedMessage};
