use crate::domain::DeadLetterService;
use common::nats::{ConsumeResponse, QueuedMessage, ORIGINAL_MESSAGE_ID_HEADER};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::Service;

/// The originating message id survives the hop to the dead-letter stream
/// as a header; a message published there directly falls back to its own id.
pub fn dead_letter_event_id(req: &QueuedMessage) -> String {
    req.header(ORIGINAL_MESSAGE_ID_HEADER)
        .unwrap_or(req.message_id.as_str())
        .to_string()
}

/// Terminal consumer of the dead-letter stream. Never fails a message.
#[derive(Clone)]
pub struct DeadLetterConsumerService {
    domain_service: DeadLetterService,
}

impl DeadLetterConsumerService {
    pub fn new(domain_service: DeadLetterService) -> Self {
        Self { domain_service }
    }
}

impl Service<QueuedMessage> for DeadLetterConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: QueuedMessage) -> Self::Future {
        let event_id = dead_letter_event_id(&req);

        self.domain_service
            .handle(&event_id, &req.payload, req.attributes());

        Box::pin(async move { Ok(ConsumeResponse::ack()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_nats::HeaderMap;
    use bytes::Bytes;
    use common::nats::{DELIVERY_ATTEMPTS_HEADER, FAILURE_REASON_HEADER, SOURCE_CONSUMER_HEADER};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_acks_and_uses_original_message_id() {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGINAL_MESSAGE_ID_HEADER, "42");

        let forwarded = QueuedMessage::new(
            "7",
            1,
            "events_dlq.transformer",
            Bytes::new(),
            Some(headers.clone()),
        );
        assert_eq!(dead_letter_event_id(&forwarded), "42");

        let response = DeadLetterConsumerService::new(DeadLetterService::new())
            .oneshot(QueuedMessage::new(
                "7",
                1,
                "events_dlq.transformer",
                Bytes::from_static(b"not-json"),
                Some(headers),
            ))
            .await
            .unwrap();

        assert!(response.is_ack());
    }

    #[test]
    fn test_forwarded_message_yields_record_for_original_event() {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGINAL_MESSAGE_ID_HEADER, "4");
        headers.insert(DELIVERY_ATTEMPTS_HEADER, "5");
        headers.insert(FAILURE_REASON_HEADER, "Decode failed: invalid JSON");
        headers.insert(SOURCE_CONSUMER_HEADER, "transformer");

        let forwarded = QueuedMessage::new(
            "1",
            1,
            "events_dlq.transformer",
            Bytes::from_static(b"not-json"),
            Some(headers),
        );

        let record = DeadLetterService::new().handle(
            &dead_letter_event_id(&forwarded),
            &forwarded.payload,
            forwarded.attributes(),
        );

        assert_eq!(record.event_id, "4");
        assert_eq!(record.failed_payload, "not-json");
        let attribute = |name: &str| record.message_attributes.get(name).map(String::as_str);
        assert_eq!(attribute(DELIVERY_ATTEMPTS_HEADER), Some("5"));
        assert_eq!(attribute(FAILURE_REASON_HEADER), Some("Decode failed: invalid JSON"));
        assert_eq!(attribute(SOURCE_CONSUMER_HEADER), Some("transformer"));
        assert_eq!(attribute("subject"), Some("events_dlq.transformer"));
    }

    #[tokio::test]
    async fn test_acks_empty_body() {
        let direct = QueuedMessage::new("8", 3, "events_dlq.archiver", Bytes::new(), None);
        assert_eq!(dead_letter_event_id(&direct), "8");

        let response = DeadLetterConsumerService::new(DeadLetterService::new())
            .oneshot(direct)
            .await
            .unwrap();

        assert!(response.is_ack());
    }
}
