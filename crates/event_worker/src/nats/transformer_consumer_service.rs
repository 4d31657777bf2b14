use crate::domain::TransformService;
use common::domain::DomainError;
use common::nats::{ConsumeResponse, QueuedMessage};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Maps transform outcomes onto queue responses.
///
/// Decode and load failures are retried. Validation failures cannot succeed
/// on retry, so they are rejected straight to the dead-letter stream unless
/// `reject_invalid_events` is off.
#[derive(Clone)]
pub struct TransformerConsumerService {
    domain_service: Arc<TransformService>,
    reject_invalid_events: bool,
}

impl TransformerConsumerService {
    pub fn new(domain_service: Arc<TransformService>, reject_invalid_events: bool) -> Self {
        Self {
            domain_service,
            reject_invalid_events,
        }
    }
}

impl Service<QueuedMessage> for TransformerConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: QueuedMessage) -> Self::Future {
        let domain_service = Arc::clone(&self.domain_service);
        let reject_invalid_events = self.reject_invalid_events;

        Box::pin(async move {
            let response = match domain_service
                .transform(&req.message_id, &req.payload)
                .await
            {
                Ok(_) => ConsumeResponse::ack(),
                Err(e @ DomainError::ValidationFailed(_)) if reject_invalid_events => {
                    ConsumeResponse::reject(e.to_string())
                }
                Err(e) => ConsumeResponse::nak(e.to_string()),
            };
            Ok(response)
        })
    }
}
