use crate::nats::{
    ConsumeResponse, DeliveryPolicy, Disposition, JetStreamConsumer, JetStreamPublisher,
    PullConsumer, QueuedMessage, DELIVERY_ATTEMPTS_HEADER, FAILURE_REASON_HEADER,
    ORIGINAL_MESSAGE_ID_HEADER, SOURCE_CONSUMER_HEADER,
};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, AckKind};
use async_nats::HeaderMap;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub stream_name: String,
    pub consumer_name: String,
    pub filter_subject: String,
    pub batch_size: usize,
    pub max_wait: Duration,
    pub ack_wait: Duration,
}

/// Where exhausted or rejected messages are republished
#[derive(Clone)]
pub struct DeadLetterSink {
    pub publisher: Arc<dyn JetStreamPublisher>,
    pub stream_name: String,
}

impl DeadLetterSink {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>, stream_name: impl Into<String>) -> Self {
        Self {
            publisher,
            stream_name: stream_name.into(),
        }
    }

    pub fn subject_for(&self, consumer_name: &str) -> String {
        format!("{}.{}", self.stream_name, consumer_name)
    }
}

/// Durable pull consumer feeding messages one at a time through a tower service.
///
/// The service only says what it wants (`ConsumeResponse`); this type owns the
/// redelivery discipline. Retries are nak'ed with the policy's backoff, and
/// messages that are rejected or out of attempts are republished to the
/// dead-letter sink before being terminated.
pub struct TowerConsumer<S> {
    consumer: Box<dyn PullConsumer>,
    settings: ConsumerSettings,
    policy: DeliveryPolicy,
    dead_letter: Option<DeadLetterSink>,
    service: S,
}

impl<S> TowerConsumer<S>
where
    S: Service<QueuedMessage, Response = ConsumeResponse, Error = anyhow::Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        settings: ConsumerSettings,
        policy: DeliveryPolicy,
        dead_letter: Option<DeadLetterSink>,
        service: S,
    ) -> Result<Self> {
        debug!(
            stream = %settings.stream_name,
            consumer = %settings.consumer_name,
            filter_subject = %settings.filter_subject,
            "creating tower nats consumer"
        );

        // the broker redelivers without limit; DeliveryPolicy decides when to stop
        let config = jetstream::consumer::pull::Config {
            name: Some(settings.consumer_name.clone()),
            durable_name: Some(settings.consumer_name.clone()),
            filter_subject: settings.filter_subject.clone(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ack_wait: settings.ack_wait,
            max_deliver: -1,
            ..Default::default()
        };

        let consumer = jetstream
            .create_consumer(config, &settings.stream_name)
            .await
            .context("failed to create consumer")?;

        Ok(Self {
            consumer,
            settings,
            policy,
            dead_letter,
            service,
        })
    }

    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(
            stream = %self.settings.stream_name,
            consumer = %self.settings.consumer_name,
            "starting tower nats consumer"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(
                        stream = %self.settings.stream_name,
                        consumer = %self.settings.consumer_name,
                        "received shutdown signal, stopping consumer"
                    );
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(
                            stream = %self.settings.stream_name,
                            consumer = %self.settings.consumer_name,
                            error = %e,
                            "error processing batch"
                        );
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn fetch_and_process_batch(&mut self) -> Result<()> {
        let raw_messages = self
            .consumer
            .fetch_messages(self.settings.batch_size, self.settings.max_wait)
            .await?;

        if raw_messages.is_empty() {
            debug!("no messages in batch");
            return Ok(());
        }

        debug!(message_count = raw_messages.len(), "received message batch");

        for msg in &raw_messages {
            let info = match msg.info() {
                Ok(info) => info,
                Err(e) => {
                    error!(subject = %msg.subject, error = %e, "message has no delivery info");
                    if let Err(e) = msg.ack_with(AckKind::Nak(None)).await {
                        error!(subject = %msg.subject, error = %e, "failed to nak message");
                    }
                    continue;
                }
            };

            let request = QueuedMessage::new(
                info.stream_sequence.to_string(),
                info.delivered.max(1) as u64,
                msg.subject.to_string(),
                Bytes::copy_from_slice(&msg.payload),
                msg.headers.clone(),
            );

            let kind = self.handle(request).await;
            let result = match kind {
                AckKind::Ack => msg.ack().await,
                other => msg.ack_with(other).await,
            };
            if let Err(e) = result {
                error!(subject = %msg.subject, error = %e, "failed to settle message");
            }
        }

        Ok(())
    }

    /// Run one message through the service and decide how to settle it
    async fn handle(&mut self, request: QueuedMessage) -> AckKind {
        let response = match self.service.ready().await {
            Ok(service) => service.call(request.clone()).await,
            Err(e) => Err(e),
        };

        let response = response.unwrap_or_else(|e| {
            error!(
                message_id = %request.message_id,
                error = %e,
                "service error processing message"
            );
            ConsumeResponse::nak(e.to_string())
        });

        let disposition = self.policy.decide(&response, request.delivery_attempt);
        self.settle(&request, disposition).await
    }

    async fn settle(&self, request: &QueuedMessage, disposition: Disposition) -> AckKind {
        match disposition {
            Disposition::Ack => AckKind::Ack,
            Disposition::Retry(delay) => {
                warn!(
                    message_id = %request.message_id,
                    delivery_attempt = request.delivery_attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    "message will be redelivered"
                );
                AckKind::Nak(Some(delay))
            }
            Disposition::DeadLetter(reason) => {
                let Some(sink) = &self.dead_letter else {
                    error!(
                        message_id = %request.message_id,
                        reason = %reason,
                        "dropping message with no dead-letter sink"
                    );
                    return AckKind::Term;
                };

                match self.forward_to_dead_letter(sink, request, &reason).await {
                    Ok(()) => {
                        warn!(
                            message_id = %request.message_id,
                            delivery_attempt = request.delivery_attempt,
                            reason = %reason,
                            "message dead-lettered"
                        );
                        AckKind::Term
                    }
                    Err(e) => {
                        error!(
                            message_id = %request.message_id,
                            error = %e,
                            "failed to dead-letter message, leaving it for redelivery"
                        );
                        AckKind::Nak(Some(self.policy.backoff_for(request.delivery_attempt)))
                    }
                }
            }
        }
    }

    async fn forward_to_dead_letter(
        &self,
        sink: &DeadLetterSink,
        request: &QueuedMessage,
        reason: &str,
    ) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGINAL_MESSAGE_ID_HEADER, request.message_id.as_str());
        headers.insert(
            DELIVERY_ATTEMPTS_HEADER,
            request.delivery_attempt.to_string().as_str(),
        );
        headers.insert(FAILURE_REASON_HEADER, single_line(reason).as_str());
        headers.insert(SOURCE_CONSUMER_HEADER, self.settings.consumer_name.as_str());

        sink.publisher
            .publish_with_headers(
                sink.subject_for(&self.settings.consumer_name),
                headers,
                request.payload.clone(),
            )
            .await
    }
}

/// Header values cannot span lines; store error text often does.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
