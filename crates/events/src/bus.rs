//! Fan-out publication (mechanics only).
//!
//! A bus routes each published envelope to every queue subscribed to its
//! topic. It is the only way one worker hands work to another.
//!
//! The bus provides **at-least-once delivery** into each subscribed queue:
//! - a publish that fails may be retried by the caller, producing duplicates
//! - there is no ordering between topics, nor between publishers
//! - consumers must be idempotent

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::envelope::{DeliveryEnvelope, EnvelopeError};
use crate::queue::QueueError;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error(transparent)]
    Encode(#[from] EnvelopeError),

    #[error("failed to enqueue on {queue}: {source}")]
    Enqueue {
        queue: String,
        #[source]
        source: QueueError,
    },

    #[error("bus transport error: {0}")]
    Transport(String),

    #[error("bus state poisoned")]
    Poisoned,
}

/// Domain-agnostic notification bus (topic → queues fan-out).
///
/// The trait requires `Send + Sync` so one bus can be shared by every
/// component of a worker process.
pub trait NotificationBus: Send + Sync {
    /// Deliver `envelope` to every queue subscribed to its topic.
    fn publish(&self, envelope: &DeliveryEnvelope) -> Result<(), BusError>;
}

impl<B> NotificationBus for Arc<B>
where
    B: NotificationBus + ?Sized,
{
    fn publish(&self, envelope: &DeliveryEnvelope) -> Result<(), BusError> {
        (**self).publish(envelope)
    }
}

/// Typed publishing on top of any [`NotificationBus`].
pub trait PublishExt {
    /// Wrap `payload` in an envelope for `topic` and publish it.
    fn publish_message<T: Serialize>(&self, topic: &str, payload: &T) -> Result<Uuid, BusError>;
}

impl<B> PublishExt for B
where
    B: NotificationBus + ?Sized,
{
    fn publish_message<T: Serialize>(&self, topic: &str, payload: &T) -> Result<Uuid, BusError> {
        let envelope = DeliveryEnvelope::wrap(topic, payload)?;
        self.publish(&envelope)?;
        Ok(envelope.message_id())
    }
}
