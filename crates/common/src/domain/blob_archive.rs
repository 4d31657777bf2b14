use async_trait::async_trait;
use bytes::Bytes;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Object storage addressed by bucket and key
///
/// `put` on an existing key overwrites it, which is what makes archival
/// of redelivered messages idempotent.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BlobArchive: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()>;

    async fn get(&self, bucket: &str, key: &str) -> anyhow::Result<Bytes>;
}
