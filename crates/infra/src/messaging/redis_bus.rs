//! Notification bus that fans envelopes out into Redis streams.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use strata_events::{BusError, DeliveryEnvelope, NotificationBus};

use super::BODY_FIELD;

/// Topic → stream routing table over one Redis client.
#[derive(Debug, Clone)]
pub struct RedisNotificationBus {
    client: Arc<redis::Client>,
    routes: HashMap<String, Vec<String>>,
}

impl RedisNotificationBus {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(Self::with_client(Arc::new(client)))
    }

    pub fn with_client(client: Arc<redis::Client>) -> Self {
        Self {
            client,
            routes: HashMap::new(),
        }
    }

    /// Deliver every envelope published on `topic` into `stream_key`.
    pub fn route(mut self, topic: impl Into<String>, stream_key: impl Into<String>) -> Self {
        self.routes
            .entry(topic.into())
            .or_default()
            .push(stream_key.into());
        self
    }

    pub fn streams_for(&self, topic: &str) -> &[String] {
        self.routes.get(topic).map(Vec::as_slice).unwrap_or_default()
    }
}

impl NotificationBus for RedisNotificationBus {
    #[instrument(
        skip(self, envelope),
        fields(topic = %envelope.topic(), message_id = %envelope.message_id()),
        err
    )]
    fn publish(&self, envelope: &DeliveryEnvelope) -> Result<(), BusError> {
        let streams = self.streams_for(envelope.topic());
        if streams.is_empty() {
            debug!("no subscribers for topic");
            return Ok(());
        }

        let body = envelope.to_body()?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for stream in streams {
            pipe.cmd("XADD").arg(stream).arg("*").arg(BODY_FIELD).arg(&body);
        }

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| BusError::Transport(e.to_string()))?;
        let _: Vec<String> = pipe
            .query(&mut conn)
            .map_err(|e| BusError::Transport(format!("XADD fan-out failed: {e}")))?;
        Ok(())
    }
}
