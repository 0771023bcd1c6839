//! In-memory work queue for tests/dev.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::queue::{MessageQueue, QueueError, ReceiptHandle, ReceivedMessage};

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Entry {
    id: String,
    body: String,
    visible_at: Instant,
    receive_count: u32,
}

/// In-memory queue with visibility-timeout redelivery.
///
/// - No IO
/// - Blocking long-poll via a condition variable
/// - Unacknowledged messages reappear after the visibility timeout
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    visibility_timeout: Duration,
    entries: Mutex<Vec<Entry>>,
    available: Condvar,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_visibility_timeout(name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            entries: Mutex::new(Vec::new()),
            available: Condvar::new(),
        }
    }

    /// Messages still owned by the queue (visible or in flight).
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages a receive would hand out right now.
    pub fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|e| e.iter().filter(|m| m.visible_at <= now).count())
            .unwrap_or(0)
    }

    /// How many times a message has been delivered.
    pub fn receive_count(&self, message_id: &str) -> Option<u32> {
        let entries = self.entries.lock().ok()?;
        entries.iter().find(|e| e.id == message_id).map(|e| e.receive_count)
    }

    /// Raw bodies still in the queue, oldest first.
    pub fn bodies(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Make every in-flight message visible again (simulates the visibility
    /// timeout elapsing).
    pub fn expire_in_flight(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            let now = Instant::now();
            for e in entries.iter_mut() {
                e.visible_at = e.visible_at.min(now);
            }
        }
        self.available.notify_all();
    }
}

impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, body: &str) -> Result<String, QueueError> {
        let id = Uuid::now_v7().to_string();
        let mut entries = self.entries.lock().map_err(|_| QueueError::Poisoned)?;
        entries.push(Entry {
            id: id.clone(),
            body: body.to_string(),
            visible_at: Instant::now(),
            receive_count: 0,
        });
        drop(entries);

        self.available.notify_one();
        Ok(id)
    }

    fn receive(&self, max_wait: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + max_wait;
        let mut entries = self.entries.lock().map_err(|_| QueueError::Poisoned)?;

        loop {
            let now = Instant::now();
            if let Some(entry) = entries.iter_mut().find(|e| e.visible_at <= now) {
                entry.visible_at = now + self.visibility_timeout;
                entry.receive_count += 1;
                return Ok(Some(ReceivedMessage {
                    message_id: entry.id.clone(),
                    receipt: ReceiptHandle::new(format!("{}#{}", entry.id, entry.receive_count)),
                    body: entry.body.clone(),
                }));
            }

            if now >= deadline {
                return Ok(None);
            }

            // Wake for whichever comes first: the deadline or the next
            // in-flight message becoming visible again.
            let wake_at = entries
                .iter()
                .map(|e| e.visible_at)
                .min()
                .map_or(deadline, |t| t.min(deadline));

            let (guard, _) = self
                .available
                .wait_timeout(entries, wake_at.saturating_duration_since(now))
                .map_err(|_| QueueError::Poisoned)?;
            entries = guard;
        }
    }

    fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let id = receipt
            .as_str()
            .split_once('#')
            .map(|(id, _)| id)
            .ok_or_else(|| QueueError::Malformed(format!("bad receipt handle: {receipt}")))?;

        let mut entries = self.entries.lock().map_err(|_| QueueError::Poisoned)?;
        entries.retain(|e| e.id != id);
        Ok(())
    }
}
