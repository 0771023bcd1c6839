use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outer delivery wrapper for everything that travels through a queue.
///
/// The bus stamps a message id, the topic and a timestamp; the application
/// payload rides along as a JSON *string* in `Message` and is decoded in a
/// second step (see [`DeliveryEnvelope::decode`]).
///
/// ```text
/// {"MessageId": "...", "Topic": "job-results", "Timestamp": "...", "Message": "{\"job_id\": ...}"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryEnvelope {
    message_id: Uuid,
    topic: String,
    timestamp: DateTime<Utc>,
    message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Envelope(serde_json::Error),

    #[error("malformed payload: {0}")]
    Payload(serde_json::Error),

    #[error("failed to encode payload: {0}")]
    Encode(serde_json::Error),
}

impl DeliveryEnvelope {
    /// Wrap an application payload for publication on `topic`.
    pub fn wrap<T: Serialize>(topic: impl Into<String>, payload: &T) -> Result<Self, EnvelopeError> {
        let message = serde_json::to_string(payload).map_err(EnvelopeError::Encode)?;
        Ok(Self {
            message_id: Uuid::now_v7(),
            topic: topic.into(),
            timestamp: Utc::now(),
            message,
        })
    }

    /// Parse the outer wrapper from a raw queue body.
    pub fn from_body(body: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(body).map_err(EnvelopeError::Envelope)
    }

    /// Serialize the outer wrapper into a queue body.
    pub fn to_body(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    /// Decode the nested application payload.
    ///
    /// Missing required fields surface here as [`EnvelopeError::Payload`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_str(&self.message).map_err(EnvelopeError::Payload)
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
