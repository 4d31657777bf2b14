use crate::domain::BulkIngestionService;
use anyhow::{Context, Result};
use async_nats::jetstream;
use common::nats::get_or_create_bucket;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Turns new objects in the uploads bucket into bulk ingestion runs
pub struct UploadWatcher {
    jetstream: jetstream::Context,
    bucket: String,
    service: Arc<BulkIngestionService>,
}

impl UploadWatcher {
    pub fn new(
        jetstream: jetstream::Context,
        bucket: impl Into<String>,
        service: Arc<BulkIngestionService>,
    ) -> Self {
        Self {
            jetstream,
            bucket: bucket.into(),
            service,
        }
    }

    /// Watch until cancelled. Each upload is processed on its own task and
    /// its outcome is only logged.
    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let store = get_or_create_bucket(&self.jetstream, &self.bucket).await?;
        let mut updates = store
            .watch()
            .await
            .with_context(|| format!("failed to watch bucket {}", self.bucket))?;

        info!(bucket = %self.bucket, "watching for uploads");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(bucket = %self.bucket, "stopping upload watcher");
                    return Ok(());
                }
                update = updates.next() => {
                    let info = match update {
                        Some(Ok(info)) => info,
                        Some(Err(e)) => {
                            warn!(bucket = %self.bucket, error = %e, "upload watch error");
                            continue;
                        }
                        None => {
                            warn!(bucket = %self.bucket, "upload watch ended");
                            return Ok(());
                        }
                    };

                    if info.deleted {
                        debug!(key = %info.name, "ignoring deleted object");
                        continue;
                    }

                    let service = Arc::clone(&self.service);
                    let bucket = self.bucket.clone();
                    tokio::spawn(async move {
                        if let Err(e) = service.submit_bulk_file(&bucket, &info.name).await {
                            error!(bucket = %bucket, key = %info.name, error = %e, "bulk ingestion failed");
                        }
                    });
                }
            }
        }
    }
}
