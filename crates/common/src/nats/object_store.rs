use crate::domain::BlobArchive;
use anyhow::{Context, Result};
use async_nats::jetstream;
use async_nats::jetstream::object_store::{ObjectMetadata, ObjectStore};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::debug;

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Open an object store bucket, creating it on first use
pub async fn get_or_create_bucket(
    jetstream: &jetstream::Context,
    bucket: &str,
) -> Result<ObjectStore> {
    match jetstream.get_object_store(bucket).await {
        Ok(store) => Ok(store),
        Err(_) => {
            debug!(bucket = %bucket, "creating object store bucket");
            jetstream
                .create_object_store(jetstream::object_store::Config {
                    bucket: bucket.to_string(),
                    ..Default::default()
                })
                .await
                .with_context(|| format!("failed to create object store bucket {bucket}"))
        }
    }
}

/// `BlobArchive` backed by JetStream object store buckets
pub struct NatsBlobArchive {
    jetstream: jetstream::Context,
    buckets: Mutex<HashMap<String, ObjectStore>>,
}

impl NatsBlobArchive {
    pub fn new(jetstream: jetstream::Context) -> Self {
        Self {
            jetstream,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    async fn bucket(&self, bucket: &str) -> Result<ObjectStore> {
        if let Some(store) = self.buckets.lock().await.get(bucket) {
            return Ok(store.clone());
        }

        // opened outside the lock; a concurrent open of the same bucket is harmless
        let store = get_or_create_bucket(&self.jetstream, bucket).await?;
        self.buckets
            .lock()
            .await
            .insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

#[async_trait]
impl BlobArchive for NatsBlobArchive {
    async fn put(&self, bucket: &str, key: &str, content: Bytes, content_type: &str) -> Result<()> {
        let store = self.bucket(bucket).await?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE_HEADER, content_type);
        let metadata = ObjectMetadata {
            name: key.to_string(),
            headers: Some(headers),
            ..Default::default()
        };

        let mut reader = &content[..];
        store
            .put(metadata, &mut reader)
            .await
            .with_context(|| format!("failed to upload object {bucket}/{key}"))?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let store = self.bucket(bucket).await?;

        let mut object = store
            .get(key)
            .await
            .with_context(|| format!("failed to get object {bucket}/{key}"))?;

        let mut buf = Vec::new();
        object
            .read_to_end(&mut buf)
            .await
            .context("failed to read object content")?;

        Ok(Bytes::from(buf))
    }
}
