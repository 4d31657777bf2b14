use crate::domain::{BulkIngestionService, EventIngestionService};
use crate::http::{router, AppState};
use crate::nats::{RawEventProducer, UploadWatcher};
use anyhow::Context;
use common::domain::BlobArchive;
use common::nats::NatsClient;
use shopstream_runner::{AppProcess, ProcessFuture};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct IngestGatewayConfig {
    pub bind_address: String,
    pub ingest_subject: String,
    pub uploads_bucket: String,
}

/// HTTP listener plus the bulk upload watcher
pub struct IngestGateway {
    config: IngestGatewayConfig,
    router: axum::Router,
    watcher: UploadWatcher,
}

impl IngestGateway {
    pub fn new(
        nats_client: &NatsClient,
        archive: Arc<dyn BlobArchive>,
        config: IngestGatewayConfig,
    ) -> Self {
        info!("Initializing ingest gateway");

        let producer = Arc::new(RawEventProducer::new(
            nats_client.create_publisher_client(),
            config.ingest_subject.clone(),
        ));

        let ingestion = Arc::new(EventIngestionService::new(producer.clone()));
        let bulk = Arc::new(BulkIngestionService::new(archive, producer));

        let watcher = UploadWatcher::new(
            nats_client.jetstream().clone(),
            config.uploads_bucket.clone(),
            bulk,
        );

        Self {
            router: router(AppState { ingestion }),
            watcher,
            config,
        }
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        let bind_address = self.config.bind_address;
        let app = self.router;
        let watcher = self.watcher;

        let http_server: AppProcess = Box::new(move |ctx: CancellationToken| -> ProcessFuture {
            Box::pin(async move {
                let listener = tokio::net::TcpListener::bind(&bind_address)
                    .await
                    .with_context(|| format!("failed to bind {bind_address}"))?;
                info!(address = %bind_address, "HTTP server listening");

                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { ctx.cancelled().await })
                    .await
                    .context("HTTP server failed")
            })
        });

        let upload_watcher: AppProcess =
            Box::new(move |ctx: CancellationToken| -> ProcessFuture { Box::pin(watcher.run(ctx)) });

        vec![("http-server", http_server), ("upload-watcher", upload_watcher)]
    }
}
