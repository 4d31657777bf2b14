use anyhow::Context;
use common::domain::{BlobArchive, DomainError, DomainResult, RawEventProducer};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Replays a newline-delimited JSON file from object storage onto the queue
pub struct BulkIngestionService {
    archive: Arc<dyn BlobArchive>,
    producer: Arc<dyn RawEventProducer>,
}

impl BulkIngestionService {
    pub fn new(archive: Arc<dyn BlobArchive>, producer: Arc<dyn RawEventProducer>) -> Self {
        Self { archive, producer }
    }

    /// Publish every parseable line of `bucket/key`, one confirmed publish at
    /// a time. Lines that fail to parse or publish are skipped, so a partial
    /// count is a normal outcome. Field validation happens downstream.
    #[instrument(skip(self), fields(bucket = %bucket, key = %key))]
    pub async fn submit_bulk_file(&self, bucket: &str, key: &str) -> DomainResult<usize> {
        let content = self
            .archive
            .get(bucket, key)
            .await
            .with_context(|| format!("failed to read bulk file {bucket}/{key}"))
            .map_err(DomainError::WriteError)?;

        let text = std::str::from_utf8(&content)
            .with_context(|| format!("bulk file {bucket}/{key} is not UTF-8"))
            .map_err(DomainError::WriteError)?;

        let mut published = 0usize;
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_number = index + 1;

            let event: Value = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(line_number, error = %e, "skipping unparseable line");
                    continue;
                }
            };

            match self.producer.publish_raw_event(&event).await {
                Ok(()) => published += 1,
                Err(e) => warn!(line_number, error = %e, "skipping line that failed to publish"),
            }
        }

        info!(published, "bulk file processed");
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::domain::{MockBlobArchive, MockRawEventProducer};
    use mockall::Sequence;
    use serde_json::json;

    fn archive_with(content: &'static str) -> MockBlobArchive {
        let mut archive = MockBlobArchive::new();
        archive
            .expect_get()
            .withf(|bucket: &str, key: &str| bucket == "uploads" && key == "batch.jsonl")
            .times(1)
            .returning(move |_, _| Ok(Bytes::from_static(content.as_bytes())));
        archive
    }

    #[tokio::test]
    async fn test_skips_blank_and_malformed_lines() {
        let archive = archive_with(
            "{\"userId\":\"u1\",\"eventType\":\"view\"}\n\nnot-json\n{\"userId\":\"u2\",\"eventType\":\"click\"}\n",
        );

        let mut producer = MockRawEventProducer::new();
        let mut seq = Sequence::new();
        producer
            .expect_publish_raw_event()
            .withf(|event: &Value| event["userId"] == json!("u1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        producer
            .expect_publish_raw_event()
            .withf(|event: &Value| event["userId"] == json!("u2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let service = BulkIngestionService::new(Arc::new(archive), Arc::new(producer));
        let published = service.submit_bulk_file("uploads", "batch.jsonl").await.unwrap();

        assert_eq!(published, 2);
    }

    #[tokio::test]
    async fn test_lines_are_not_validated() {
        let archive = archive_with("{\"eventType\":\"view\"}\n");
        let mut producer = MockRawEventProducer::new();
        producer
            .expect_publish_raw_event()
            .times(1)
            .returning(|_| Ok(()));

        let service = BulkIngestionService::new(Arc::new(archive), Arc::new(producer));

        assert_eq!(
            service.submit_bulk_file("uploads", "batch.jsonl").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_publish_failure_skips_line_and_continues() {
        let archive = archive_with("{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n");
        let mut producer = MockRawEventProducer::new();
        producer
            .expect_publish_raw_event()
            .times(3)
            .returning(|event| {
                if event["n"] == json!(2) {
                    Err(DomainError::PublishError(anyhow::anyhow!("timeout")))
                } else {
                    Ok(())
                }
            });

        let service = BulkIngestionService::new(Arc::new(archive), Arc::new(producer));

        assert_eq!(
            service.submit_bulk_file("uploads", "batch.jsonl").await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_fails_whole_call() {
        let mut archive = MockBlobArchive::new();
        archive
            .expect_get()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("object not found")));
        let mut producer = MockRawEventProducer::new();
        producer.expect_publish_raw_event().never();

        let service = BulkIngestionService::new(Arc::new(archive), Arc::new(producer));
        let result = service.submit_bulk_file("uploads", "missing.jsonl").await;

        assert!(matches!(result, Err(DomainError::WriteError(_))));
    }

    #[tokio::test]
    async fn test_non_utf8_file_fails_whole_call() {
        let mut archive = MockBlobArchive::new();
        archive
            .expect_get()
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(&[0xff, 0xfe, 0x00])));
        let mut producer = MockRawEventProducer::new();
        producer.expect_publish_raw_event().never();

        let service = BulkIngestionService::new(Arc::new(archive), Arc::new(producer));

        assert!(service.submit_bulk_file("uploads", "bin").await.is_err());
    }
}
