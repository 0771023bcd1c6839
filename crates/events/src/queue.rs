//! Work queue abstraction (mechanics only).
//!
//! A queue hands out at most one message per receive and keeps it until the
//! consumer explicitly deletes it. A received-but-undeleted message becomes
//! visible again after the queue's visibility timeout, whether the consumer
//! crashed, was slow, or left it on purpose to retry later.
//!
//! Consumers must therefore be idempotent: re-processing an already-applied
//! transition has to be a safe no-op.

use std::sync::Arc;
use std::time::Duration;

/// Opaque token identifying one delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message handed to a consumer, still owned by the queue until deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt: ReceiptHandle,
    /// Raw body; normally a serialized [`DeliveryEnvelope`](crate::DeliveryEnvelope).
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue command error: {0}")]
    Command(String),

    #[error("malformed queue entry: {0}")]
    Malformed(String),

    #[error("queue state poisoned")]
    Poisoned,
}

pub trait MessageQueue: Send + Sync {
    /// Queue name (for logging).
    fn name(&self) -> &str;

    /// Append a raw body to the queue.
    fn send(&self, body: &str) -> Result<String, QueueError>;

    /// Long-poll for up to `max_wait`; `None` if nothing became visible.
    fn receive(&self, max_wait: Duration) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Acknowledge a delivery, removing the message for good.
    ///
    /// Deleting a message that is already gone succeeds.
    fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;
}

impl<Q> MessageQueue for Arc<Q>
where
    Q: MessageQueue + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn send(&self, body: &str) -> Result<String, QueueError> {
        (**self).send(body)
    }

    fn receive(&self, max_wait: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        (**self).receive(max_wait)
    }

    fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        (**self).delete(receipt)
    }
}
