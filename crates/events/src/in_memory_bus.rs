//! In-memory notification bus for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::bus::{BusError, NotificationBus};
use crate::envelope::DeliveryEnvelope;
use crate::queue::MessageQueue;

/// In-memory topic → queue fan-out.
///
/// - No IO / no async
/// - Every publication is also kept in a log for inspection
/// - Publishing can be switched to fail, to exercise retry paths
#[derive(Default)]
pub struct InMemoryNotificationBus {
    routes: Mutex<HashMap<String, Vec<Arc<dyn MessageQueue>>>>,
    published: Mutex<Vec<DeliveryEnvelope>>,
    failing: AtomicBool,
}

impl core::fmt::Debug for InMemoryNotificationBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryNotificationBus")
            .field("published", &self.published.lock().map(|p| p.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl InMemoryNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every envelope published on `topic` into `queue`.
    pub fn subscribe(&self, topic: impl Into<String>, queue: Arc<dyn MessageQueue>) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.entry(topic.into()).or_default().push(queue);
        }
    }

    /// Envelopes published on `topic` so far, oldest first.
    pub fn published(&self, topic: &str) -> Vec<DeliveryEnvelope> {
        self.published
            .lock()
            .map(|p| p.iter().filter(|e| e.topic() == topic).cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl NotificationBus for InMemoryNotificationBus {
    fn publish(&self, envelope: &DeliveryEnvelope) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Transport("publishing disabled".to_string()));
        }

        let body = envelope.to_body()?;
        let routes = self.routes.lock().map_err(|_| BusError::Poisoned)?;
        for queue in routes.get(envelope.topic()).into_iter().flatten() {
            queue.send(&body).map_err(|source| BusError::Enqueue {
                queue: queue.name().to_string(),
                source,
            })?;
        }
        drop(routes);

        self.published
            .lock()
            .map_err(|_| BusError::Poisoned)?
            .push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::PublishExt;
    use crate::in_memory_queue::InMemoryQueue;
    use crate::messages::RestoreRequest;

    #[test]
    fn fans_out_to_every_subscribed_queue() {
        let bus = InMemoryNotificationBus::new();
        let archive = Arc::new(InMemoryQueue::new("archive"));
        let notify = Arc::new(InMemoryQueue::new("notify"));
        let other = Arc::new(InMemoryQueue::new("other"));
        bus.subscribe("job-results", archive.clone());
        bus.subscribe("job-results", notify.clone());
        bus.subscribe("restore-requests", other.clone());

        bus.publish_message("job-results", &serde_json::json!({"job_id": "x"}))
            .unwrap();

        assert_eq!(archive.len(), 1);
        assert_eq!(notify.len(), 1);
        assert!(other.is_empty());
        assert_eq!(bus.published("job-results").len(), 1);
    }

    #[test]
    fn delivered_body_is_an_envelope() {
        let bus = InMemoryNotificationBus::new();
        let queue = Arc::new(InMemoryQueue::new("restore"));
        bus.subscribe("restore-requests", queue.clone());

        let req = RestoreRequest {
            user_id: strata_core::UserId::new("u-1").unwrap(),
        };
        let id = bus.publish_message("restore-requests", &req).unwrap();

        let msg = queue.receive(Duration::ZERO).unwrap().unwrap();
        let env = DeliveryEnvelope::from_body(&msg.body).unwrap();
        assert_eq!(env.message_id(), id);
        assert_eq!(env.decode::<RestoreRequest>().unwrap(), req);
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = InMemoryNotificationBus::new();
        assert!(bus.publish_message("nobody-listens", &serde_json::json!({})).is_ok());
    }

    #[test]
    fn failing_bus_reports_transport_error() {
        let bus = InMemoryNotificationBus::new();
        bus.set_failing(true);
        assert!(matches!(
            bus.publish_message("t", &serde_json::json!({})),
            Err(BusError::Transport(_))
        ));
        assert!(bus.published("t").is_empty());
    }
}
