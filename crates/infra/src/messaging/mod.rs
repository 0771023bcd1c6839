//! Redis Streams transport for queues and the notification bus.
//!
//! - **Queue**: one stream per queue, one consumer group per stream
//! - **Visibility timeout**: pending entries idle longer than the timeout are
//!   claimed by the next receiver (`XAUTOCLAIM`)
//! - **Bus**: a topic is routed to one or more streams; a publish appends to
//!   all of them in one atomic pipeline

mod parse;
pub mod redis_bus;
pub mod redis_streams;

pub use redis_bus::RedisNotificationBus;
pub use redis_streams::RedisStreamQueue;

/// Consumer group shared by every instance of one worker type.
pub const DEFAULT_GROUP: &str = "strata-workers";

/// Stream field holding the envelope body.
pub(crate) const BODY_FIELD: &str = "body";
