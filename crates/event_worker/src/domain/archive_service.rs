use bytes::Bytes;
use common::domain::{BlobArchive, JSON_CONTENT_TYPE};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Stored { key: String },
    Empty,
    Failed { key: String, reason: String },
}

pub fn archive_key(message_id: &str) -> String {
    format!("raw_event_{message_id}.json")
}

/// Keeps an exact copy of every queued payload. Never fails the message.
pub struct ArchiveService {
    archive: Arc<dyn BlobArchive>,
    bucket: String,
}

impl ArchiveService {
    pub fn new(archive: Arc<dyn BlobArchive>, bucket: impl Into<String>) -> Self {
        Self {
            archive,
            bucket: bucket.into(),
        }
    }

    pub async fn archive(&self, message_id: &str, body: Bytes) -> ArchiveOutcome {
        if body.is_empty() {
            info!(message_id, "no data to archive");
            return ArchiveOutcome::Empty;
        }

        if std::str::from_utf8(&body).is_err() {
            warn!(message_id, "payload is not valid UTF-8, archiving raw bytes");
        }

        let key = archive_key(message_id);
        match self
            .archive
            .put(&self.bucket, &key, body, JSON_CONTENT_TYPE)
            .await
        {
            Ok(()) => {
                debug!(message_id, bucket = %self.bucket, key = %key, "payload archived");
                ArchiveOutcome::Stored { key }
            }
            Err(e) => {
                error!(
                    message_id,
                    bucket = %self.bucket,
                    key = %key,
                    error = %format!("{e:#}"),
                    "failed to archive payload"
                );
                ArchiveOutcome::Failed {
                    key,
                    reason: format!("{e:#}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::MockBlobArchive;

    #[tokio::test]
    async fn test_payload_is_stored_verbatim() {
        let mut archive = MockBlobArchive::new();
        archive
            .expect_put()
            .withf(|bucket: &str, key: &str, content: &Bytes, content_type: &str| {
                bucket == "raw-events"
                    && key == "raw_event_12345.json"
                    && content == &Bytes::from_static(br#"{"a":1}"#)
                    && content_type == "application/json"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let service = ArchiveService::new(Arc::new(archive), "raw-events");
        let outcome = service
            .archive("12345", Bytes::from_static(br#"{"a":1}"#))
            .await;

        assert_eq!(
            outcome,
            ArchiveOutcome::Stored {
                key: "raw_event_12345.json".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_payload_is_skipped() {
        let mut archive = MockBlobArchive::new();
        archive.expect_put().never();

        let service = ArchiveService::new(Arc::new(archive), "raw-events");

        assert_eq!(service.archive("1", Bytes::new()).await, ArchiveOutcome::Empty);
    }

    #[tokio::test]
    async fn test_non_utf8_payload_is_still_archived() {
        let mut archive = MockBlobArchive::new();
        archive
            .expect_put()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let service = ArchiveService::new(Arc::new(archive), "raw-events");
        let outcome = service
            .archive("9", Bytes::from_static(&[0xff, 0xfe]))
            .await;

        assert!(matches!(outcome, ArchiveOutcome::Stored { .. }));
    }

    #[tokio::test]
    async fn test_write_error_is_swallowed() {
        let mut archive = MockBlobArchive::new();
        archive
            .expect_put()
            .times(1)
            .returning(|_, _, _, _| Err(anyhow::anyhow!("bucket unavailable")));

        let service = ArchiveService::new(Arc::new(archive), "raw-events");
        let outcome = service.archive("2", Bytes::from_static(b"{}")).await;

        match outcome {
            ArchiveOutcome::Failed { key, reason } => {
                assert_eq!(key, "raw_event_2.json");
                assert!(reason.contains("bucket unavailable"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
