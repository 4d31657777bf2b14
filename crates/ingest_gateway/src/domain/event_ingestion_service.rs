use common::domain::{
    parse_event_object, DomainError, DomainResult, RawEvent, RawEventProducer,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const MISSING_FIELDS: &str = "userId or eventType";

/// Synchronous entry point for single events submitted over HTTP
pub struct EventIngestionService {
    producer: Arc<dyn RawEventProducer>,
}

impl EventIngestionService {
    pub fn new(producer: Arc<dyn RawEventProducer>) -> Self {
        Self { producer }
    }

    /// Validate a request body and queue it.
    ///
    /// Returns only after the queue confirmed the write, so a successful
    /// return means the event is durable. The full parsed object is queued,
    /// including fields this service does not know about.
    #[instrument(skip(self, body), fields(body_bytes = body.len()))]
    pub async fn submit_event(&self, body: &[u8]) -> DomainResult<()> {
        let object = parse_event_object(body).map_err(DomainError::InvalidPayload)?;

        let event = RawEvent::from_object(&object);
        common::garde::validate_struct(&event)
            .map_err(|_| DomainError::MissingField(MISSING_FIELDS.to_string()))?;

        debug!(
            user_id = %event.user_id,
            event_type = %event.event_type,
            "publishing event"
        );

        self.producer
            .publish_raw_event(&Value::Object(object))
            .await?;

        debug!("event accepted");
        Ok(())
    }
}
