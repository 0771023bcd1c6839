//! Generic receive → handle → acknowledge loop.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use strata_events::{DeliveryEnvelope, MessageQueue};

use crate::outcome::Outcome;

/// Pause after a failed receive, so a dead transport does not spin the loop.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// A per-message handler.
///
/// Must be idempotent: the same message may arrive any number of times, and
/// several instances of the same handler may run at once.
pub trait MessageHandler: Send + Sync {
    /// Application payload carried inside the delivery envelope.
    type Message: DeserializeOwned;

    fn handle(&self, message: Self::Message) -> Outcome;
}

/// Result of one [`QueueWorker::poll_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// The long-poll elapsed without a message.
    Empty,
    /// A message arrived but could not be decoded; it was left in the queue.
    Malformed,
    Processed(Outcome),
    /// The queue itself failed.
    ReceiveFailed,
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub handled: u64,
    pub skipped: u64,
    pub retried: u64,
    pub malformed: u64,
    pub receive_errors: u64,
    pub ack_errors: u64,
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// The worker finishes the message in hand and exits after its current
    /// long-poll returns.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Block until the worker thread exits on its own.
    pub fn join(mut self) {
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// One queue, one handler.
pub struct QueueWorker<H: MessageHandler> {
    name: &'static str,
    queue: Arc<dyn MessageQueue>,
    handler: H,
    wait: Duration,
    stats: Arc<Mutex<WorkerStats>>,
}

impl<H: MessageHandler> core::fmt::Debug for QueueWorker<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueWorker")
            .field("name", &self.name)
            .field("queue", &self.queue.name())
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl<H: MessageHandler> QueueWorker<H> {
    /// `wait` bounds each long-poll receive.
    pub fn new(name: &'static str, queue: Arc<dyn MessageQueue>, handler: H, wait: Duration) -> Self {
        Self {
            name,
            queue,
            handler,
            wait,
            stats: Arc::new(Mutex::new(WorkerStats::default())),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, f: impl FnOnce(&mut WorkerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    /// Receive at most one message and dispose of it.
    pub fn poll_once(&self) -> Poll {
        let received = match self.queue.receive(self.wait) {
            Ok(Some(m)) => m,
            Ok(None) => {
                debug!(worker = self.name, queue = self.queue.name(), "poll elapsed");
                return Poll::Empty;
            }
            Err(e) => {
                error!(worker = self.name, queue = self.queue.name(), error = %e, "receive failed");
                self.record(|s| s.receive_errors += 1);
                return Poll::ReceiveFailed;
            }
        };
        self.record(|s| s.received += 1);

        let message = match DeliveryEnvelope::from_body(&received.body)
            .and_then(|env| env.decode::<H::Message>())
        {
            Ok(m) => m,
            Err(e) => {
                // Left for operator inspection; it recirculates until removed.
                warn!(
                    worker = self.name,
                    message_id = %received.message_id,
                    error = %e,
                    "malformed message left in queue"
                );
                self.record(|s| s.malformed += 1);
                return Poll::Malformed;
            }
        };

        let outcome = self.handler.handle(message);
        self.record(|s| match outcome {
            Outcome::Handled => s.handled += 1,
            Outcome::Skip => s.skipped += 1,
            Outcome::Retry => s.retried += 1,
        });

        if outcome.acknowledges() {
            if let Err(e) = self.queue.delete(&received.receipt) {
                // Redelivery is safe: handlers are idempotent.
                error!(
                    worker = self.name,
                    message_id = %received.message_id,
                    error = %e,
                    "failed to acknowledge message"
                );
                self.record(|s| s.ack_errors += 1);
            }
        }

        debug!(worker = self.name, message_id = %received.message_id, %outcome, "message processed");
        Poll::Processed(outcome)
    }

    /// Poll until a shutdown signal arrives (or its sender is dropped).
    pub fn run(&self, shutdown: &mpsc::Receiver<()>) {
        info!(worker = self.name, queue = self.queue.name(), "worker started");
        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
                Err(mpsc::TryRecvError::Empty) => {}
            }

            if self.poll_once() == Poll::ReceiveFailed {
                thread::sleep(RECEIVE_ERROR_BACKOFF);
            }
        }
        info!(worker = self.name, "worker stopped");
    }
}

impl<H: MessageHandler + 'static> QueueWorker<H> {
    /// Run the loop on a named background thread.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = self.stats.clone();

        let join = thread::Builder::new()
            .name(self.name.to_string())
            .spawn(move || self.run(&shutdown_rx))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use strata_events::{InMemoryQueue, MessageQueue};

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Ping {
        n: u32,
    }

    /// Answers with a fixed outcome and counts calls.
    struct Fixed {
        outcome: Outcome,
        calls: AtomicUsize,
    }

    impl MessageHandler for Fixed {
        type Message = Ping;

        fn handle(&self, message: Ping) -> Outcome {
            assert!(message.n > 0);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    fn worker(outcome: Outcome) -> (Arc<InMemoryQueue>, QueueWorker<Fixed>) {
        let queue = Arc::new(InMemoryQueue::new("test"));
        let handler = Fixed {
            outcome,
            calls: AtomicUsize::new(0),
        };
        let w = QueueWorker::new("test-worker", queue.clone(), handler, Duration::ZERO);
        (queue, w)
    }

    fn send_ping(queue: &InMemoryQueue) {
        let env = DeliveryEnvelope::wrap("t", &serde_json::json!({"n": 1})).unwrap();
        queue.send(&env.to_body().unwrap()).unwrap();
    }

    #[test]
    fn empty_queue_polls_empty() {
        let (_, w) = worker(Outcome::Handled);
        assert_eq!(w.poll_once(), Poll::Empty);
        assert_eq!(w.stats(), WorkerStats::default());
    }

    #[test]
    fn handled_and_skipped_messages_are_acknowledged() {
        for outcome in [Outcome::Handled, Outcome::Skip] {
            let (queue, w) = worker(outcome);
            send_ping(&queue);
            assert_eq!(w.poll_once(), Poll::Processed(outcome));
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn retried_message_comes_back() {
        let (queue, w) = worker(Outcome::Retry);
        send_ping(&queue);
        assert_eq!(w.poll_once(), Poll::Processed(Outcome::Retry));
        assert_eq!(queue.len(), 1);

        queue.expire_in_flight();
        assert_eq!(w.poll_once(), Poll::Processed(Outcome::Retry));
        assert_eq!(w.handler().calls.load(Ordering::SeqCst), 2);
        assert_eq!(w.stats().retried, 2);
    }

    #[test]
    fn malformed_payload_is_left_and_handler_not_called() {
        let (queue, w) = worker(Outcome::Handled);
        let env = DeliveryEnvelope::wrap("t", &serde_json::json!({"other": 1})).unwrap();
        queue.send(&env.to_body().unwrap()).unwrap();
        queue.send("not even an envelope").unwrap();

        assert_eq!(w.poll_once(), Poll::Malformed);
        assert_eq!(w.poll_once(), Poll::Malformed);
        assert_eq!(queue.len(), 2);
        assert_eq!(w.handler().calls.load(Ordering::SeqCst), 0);
        assert_eq!(w.stats().malformed, 2);
    }

    #[test]
    fn spawned_worker_drains_queue_and_shuts_down() {
        let queue = Arc::new(InMemoryQueue::new("bg"));
        for _ in 0..3 {
            send_ping(&queue);
        }
        let handler = Fixed {
            outcome: Outcome::Handled,
            calls: AtomicUsize::new(0),
        };
        let handle = QueueWorker::new("bg-worker", queue.clone(), handler, Duration::from_millis(10))
            .spawn()
            .unwrap();

        for _ in 0..200 {
            if queue.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(queue.is_empty());
        assert_eq!(handle.stats().handled, 3);
        handle.shutdown();
    }
}
