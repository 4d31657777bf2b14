use async_nats::HeaderMap;
use bytes::Bytes;
use std::collections::BTreeMap;

pub const SUBJECT_ATTRIBUTE: &str = "subject";

/// Owned copy of a delivered queue message.
///
/// Services receive this instead of the broker message so they can run
/// through tower middleware and be tested without a broker.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Stream sequence assigned by the broker, stable across redeliveries
    pub message_id: String,
    /// Starts at 1 and grows with every redelivery
    pub delivery_attempt: u64,
    pub subject: String,
    pub payload: Bytes,
    pub headers: Option<HeaderMap>,
}

impl QueuedMessage {
    pub fn new(
        message_id: impl Into<String>,
        delivery_attempt: u64,
        subject: impl Into<String>,
        payload: Bytes,
        headers: Option<HeaderMap>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            delivery_attempt,
            subject: subject.into(),
            payload,
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()
            .and_then(|headers| headers.get(name))
            .map(|value| value.as_str())
    }

    /// Headers flattened to their first value, plus the subject
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        if let Some(headers) = &self.headers {
            for (name, values) in headers.iter() {
                if let Some(value) = values.first() {
                    attributes.insert(name.to_string(), value.as_str().to_string());
                }
            }
        }
        attributes.insert(SUBJECT_ATTRIBUTE.to_string(), self.subject.clone());
        attributes
    }
}

/// What a service wants done with the message it was handed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    Ack,
    /// Transient failure, redeliver after backoff
    Nak(String),
    /// Permanent failure, dead-letter without further attempts
    Reject(String),
}

impl ConsumeResponse {
    pub fn ack() -> Self {
        Self::Ack
    }

    pub fn nak(reason: impl Into<String>) -> Self {
        Self::Nak(reason.into())
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(reason.into())
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nak(_) => "nak",
            Self::Reject(_) => "reject",
        }
    }
}
