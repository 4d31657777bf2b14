use crate::domain::ArchiveService;
use common::nats::{ConsumeResponse, QueuedMessage};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Always acks; archival failures are logged by the domain service
#[derive(Clone)]
pub struct ArchiverConsumerService {
    domain_service: Arc<ArchiveService>,
}

impl ArchiverConsumerService {
    pub fn new(domain_service: Arc<ArchiveService>) -> Self {
        Self { domain_service }
    }
}

impl Service<QueuedMessage> for ArchiverConsumerService {
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: QueuedMessage) -> Self::Future {
        let domain_service = Arc::clone(&self.domain_service);

        Box::pin(async move {
            domain_service.archive(&req.message_id, req.payload).await;
            Ok(ConsumeResponse::ack())
        })
    }
}
