use anyhow::Context;
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult, RawEventProducer as RawEventProducerTrait};
use common::nats::JetStreamPublisher;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Publishes raw events as JSON onto the events stream
pub struct RawEventProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
    subject: String,
}

impl RawEventProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, subject: String) -> Self {
        debug!(subject = %subject, "created raw event producer");
        Self { jetstream, subject }
    }
}

#[async_trait]
impl RawEventProducerTrait for RawEventProducer {
    async fn publish_raw_event(&self, event: &Value) -> DomainResult<()> {
        let payload = serde_json::to_vec(event)
            .context("Failed to serialize event")
            .map_err(DomainError::PublishError)?;

        debug!(
            subject = %self.subject,
            size_bytes = payload.len(),
            "publishing raw event"
        );

        self.jetstream
            .publish(self.subject.clone(), payload.into())
            .await
            .context("Failed to publish and acknowledge event")
            .map_err(DomainError::PublishError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::nats::MockJetStreamPublisher;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_serializes_event_in_key_order() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .withf(|subject: &String, payload: &Bytes| {
                subject == "events.ingested"
                    && payload == &Bytes::from(r#"{"userId":"u1","eventType":"click","extra":true}"#)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let producer =
            RawEventProducer::new(Arc::new(mock_jetstream), "events.ingested".to_string());

        let result = producer
            .publish_raw_event(&json!({"userId": "u1", "eventType": "click", "extra": true}))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_publish_failure_is_publish_error() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("NATS publish failed")));

        let producer =
            RawEventProducer::new(Arc::new(mock_jetstream), "events.ingested".to_string());

        let result = producer.publish_raw_event(&json!({"userId": "u1"})).await;

        match result {
            Err(DomainError::PublishError(e)) => {
                assert!(format!("{e:#}").contains("NATS publish failed"))
            }
            other => panic!("expected PublishError, got {other:?}"),
        }
    }
}
