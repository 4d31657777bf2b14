use crate::domain::{ArchiveService, DeadLetterService, TransformService};
use crate::nats::{
    ArchiverConsumerService, DeadLetterConsumerService, TransformerConsumerService,
};
use common::domain::{BlobArchive, RowStore};
use common::nats::{
    ConsumeResponse, ConsumerSettings, DeadLetterSink, DeliveryPolicy, NatsClient,
    NatsConsumeLoggingLayer, NatsConsumeTracingLayer, QueuedMessage, TowerConsumer,
};
use shopstream_runner::{AppProcess, ProcessFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceBuilder};
use tracing::info;

#[derive(Debug, Clone)]
pub struct EventWorkerConfig {
    pub stream_name: String,
    pub dead_letter_stream: String,
    pub archiver_consumer: String,
    pub transformer_consumer: String,
    pub dead_letter_consumer: String,
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub ack_wait: Duration,
    pub delivery_policy: DeliveryPolicy,
    pub raw_bucket: String,
    pub staging_table: String,
    pub reject_invalid_events: bool,
}

/// Archiver, transformer and dead-letter handler, each on its own durable consumer
pub struct EventWorker {
    processes: Vec<(&'static str, AppProcess)>,
}

impl EventWorker {
    pub async fn new(
        nats_client: &NatsClient,
        archive: Arc<dyn BlobArchive>,
        row_store: Arc<dyn RowStore>,
        config: EventWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("Initializing event worker");

        let sink = DeadLetterSink::new(
            nats_client.create_publisher_client(),
            config.dead_letter_stream.clone(),
        );
        let settings = |stream: &str, consumer: &str| ConsumerSettings {
            stream_name: stream.to_string(),
            consumer_name: consumer.to_string(),
            filter_subject: format!("{stream}.*"),
            batch_size: config.batch_size,
            max_wait: config.batch_wait,
            ack_wait: config.ack_wait,
        };

        let archive_service = Arc::new(ArchiveService::new(archive, config.raw_bucket.clone()));
        let archiver = TowerConsumer::new(
            nats_client.create_consumer_client(),
            settings(&config.stream_name, &config.archiver_consumer),
            config.delivery_policy.clone(),
            Some(sink.clone()),
            ServiceBuilder::new()
                .layer(NatsConsumeTracingLayer::new(config.archiver_consumer.clone()))
                .layer(NatsConsumeLoggingLayer::new())
                .service(ArchiverConsumerService::new(archive_service)),
        )
        .await?;

        let transform_service = Arc::new(TransformService::new(
            row_store,
            config.staging_table.clone(),
        ));
        let transformer = TowerConsumer::new(
            nats_client.create_consumer_client(),
            settings(&config.stream_name, &config.transformer_consumer),
            config.delivery_policy.clone(),
            Some(sink),
            ServiceBuilder::new()
                .layer(NatsConsumeTracingLayer::new(config.transformer_consumer.clone()))
                .layer(NatsConsumeLoggingLayer::new())
                .service(TransformerConsumerService::new(
                    transform_service,
                    config.reject_invalid_events,
                )),
        )
        .await?;

        let dead_letter_handler = TowerConsumer::new(
            nats_client.create_consumer_client(),
            settings(&config.dead_letter_stream, &config.dead_letter_consumer),
            config.delivery_policy.clone(),
            None,
            ServiceBuilder::new()
                .layer(NatsConsumeTracingLayer::new(config.dead_letter_consumer.clone()))
                .layer(NatsConsumeLoggingLayer::new())
                .service(DeadLetterConsumerService::new(DeadLetterService::new())),
        )
        .await?;

        info!("Event worker initialized");

        Ok(Self {
            processes: vec![
                ("archiver", into_process(archiver)),
                ("transformer", into_process(transformer)),
                ("dead-letter-handler", into_process(dead_letter_handler)),
            ],
        })
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        self.processes
    }
}

fn into_process<S>(consumer: TowerConsumer<S>) -> AppProcess
where
    S: Service<QueuedMessage, Response = ConsumeResponse, Error = anyhow::Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    Box::new(move |ctx: CancellationToken| -> ProcessFuture { Box::pin(consumer.run(ctx)) })
}
