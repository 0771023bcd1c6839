//! Redis Streams-backed work queue (durable, at-least-once delivery).

use std::sync::Arc;
use std::time::Duration;

use redis::Value;
use tracing::{debug, instrument, warn};

use strata_events::{MessageQueue, QueueError, ReceiptHandle, ReceivedMessage};

use super::parse::{StreamEntry, parse_autoclaim_reply, parse_read_reply};
use super::{BODY_FIELD, DEFAULT_GROUP};

/// How many `XAUTOCLAIM` pages one receive scans for an expired delivery.
const MAX_CLAIM_PAGES: usize = 16;

/// One stream consumed by one consumer group.
///
/// Receipt handles are stream entry ids. Deleting acknowledges the entry
/// and removes it from the stream.
#[derive(Debug, Clone)]
pub struct RedisStreamQueue {
    client: Arc<redis::Client>,
    stream_key: String,
    group: String,
    consumer: String,
    visibility_timeout: Duration,
}

impl RedisStreamQueue {
    /// Open a queue and make sure its consumer group exists.
    pub fn new(
        redis_url: impl AsRef<str>,
        stream_key: impl Into<String>,
        consumer: impl Into<String>,
        visibility_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        Self::with_client(Arc::new(client), stream_key, consumer, visibility_timeout)
    }

    pub fn with_client(
        client: Arc<redis::Client>,
        stream_key: impl Into<String>,
        consumer: impl Into<String>,
        visibility_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let queue = Self {
            client,
            stream_key: stream_key.into(),
            group: DEFAULT_GROUP.to_string(),
            consumer: consumer.into(),
            visibility_timeout,
        };
        queue.ensure_consumer_group()?;
        Ok(queue)
    }

    fn connection(&self) -> Result<redis::Connection, QueueError> {
        self.client
            .get_connection()
            .map_err(|e| QueueError::Connection(e.to_string()))
    }

    /// `XGROUP CREATE ... MKSTREAM`, tolerating an existing group.
    fn ensure_consumer_group(&self) -> Result<(), QueueError> {
        let mut conn = self.connection()?;
        let created: redis::RedisResult<Value> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(QueueError::Command(format!("XGROUP CREATE failed: {e}"))),
        }
    }

    /// Take over one delivery whose visibility timeout has elapsed.
    fn claim_expired(
        &self,
        conn: &mut redis::Connection,
    ) -> Result<Option<StreamEntry>, QueueError> {
        let min_idle_ms = self.visibility_timeout.as_millis().to_string();
        let mut cursor = "0-0".to_string();

        for _ in 0..MAX_CLAIM_PAGES {
            let reply: Value = redis::cmd("XAUTOCLAIM")
                .arg(&self.stream_key)
                .arg(&self.group)
                .arg(&self.consumer)
                .arg(&min_idle_ms)
                .arg(&cursor)
                .arg("COUNT")
                .arg(1)
                .query(conn)
                .map_err(|e| QueueError::Command(format!("XAUTOCLAIM failed: {e}")))?;

            let (next, entries) = parse_autoclaim_reply(&reply)?;
            for entry in entries {
                if entry.body.is_some() {
                    return Ok(Some(entry));
                }
                // Deleted while pending; drop the dangling pending entry.
                self.ack(conn, &entry.id)?;
            }

            if next == "0-0" {
                break;
            }
            cursor = next;
        }
        Ok(None)
    }

    fn read_new(
        &self,
        conn: &mut redis::Connection,
        max_wait: Duration,
    ) -> Result<Option<StreamEntry>, QueueError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1);
        // BLOCK 0 would wait forever.
        let block_ms = max_wait.as_millis();
        if block_ms > 0 {
            cmd.arg("BLOCK").arg(block_ms.to_string());
        }
        cmd.arg("STREAMS").arg(&self.stream_key).arg(">");

        let reply: Value = cmd
            .query(conn)
            .map_err(|e| QueueError::Command(format!("XREADGROUP failed: {e}")))?;
        Ok(parse_read_reply(&reply, &self.stream_key)?.into_iter().next())
    }

    fn ack(&self, conn: &mut redis::Connection, id: &str) -> Result<(), QueueError> {
        let _: i64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(id)
            .query(conn)
            .map_err(|e| QueueError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }
}

impl MessageQueue for RedisStreamQueue {
    fn name(&self) -> &str {
        &self.stream_key
    }

    #[instrument(skip(self, body), fields(stream_key = %self.stream_key), err)]
    fn send(&self, body: &str) -> Result<String, QueueError> {
        let mut conn = self.connection()?;
        redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("XADD failed: {e}")))
    }

    fn receive(&self, max_wait: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut conn = self.connection()?;

        let entry = match self.claim_expired(&mut conn)? {
            Some(entry) => {
                debug!(stream_key = %self.stream_key, id = %entry.id, "redelivering expired message");
                Some(entry)
            }
            None => self.read_new(&mut conn, max_wait)?,
        };

        let Some(StreamEntry { id, body }) = entry else {
            return Ok(None);
        };
        let Some(body) = body else {
            warn!(stream_key = %self.stream_key, id = %id, "stream entry vanished before delivery");
            return Ok(None);
        };

        Ok(Some(ReceivedMessage {
            message_id: id.clone(),
            receipt: ReceiptHandle::new(id),
            body,
        }))
    }

    #[instrument(skip(self), fields(stream_key = %self.stream_key, receipt = %receipt), err)]
    fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut conn = self.connection()?;
        let _: (i64, i64) = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(receipt.as_str())
            .cmd("XDEL")
            .arg(&self.stream_key)
            .arg(receipt.as_str())
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("XACK/XDEL failed: {e}")))?;
        Ok(())
    }
}
