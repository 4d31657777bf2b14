use chrono::{DateTime, Utc};
use common::domain::{
    parse_event_object, DomainError, DomainResult, NormalizedRecord, RawEvent, RowStore,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decode, validate, enrich and load one queued event into the staging table
pub struct TransformService {
    row_store: Arc<dyn RowStore>,
    staging_table: String,
}

impl TransformService {
    pub fn new(row_store: Arc<dyn RowStore>, staging_table: impl Into<String>) -> Self {
        Self {
            row_store,
            staging_table: staging_table.into(),
        }
    }

    pub async fn transform(&self, message_id: &str, body: &[u8]) -> DomainResult<NormalizedRecord> {
        self.transform_at(message_id, body, Utc::now()).await
    }

    /// `now` is the transform time used for `ingestion_timestamp` and as the
    /// fallback event time.
    pub async fn transform_at(
        &self,
        message_id: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> DomainResult<NormalizedRecord> {
        let object = parse_event_object(body).map_err(|reason| {
            warn!(message_id, stage = "decode", reason = %reason, "event decode failed");
            DomainError::DecodeFailed(reason)
        })?;
        debug!(message_id, stage = "decoded", "event decoded");

        let event = RawEvent::from_object(&object);
        common::garde::validate_struct(&event).inspect_err(|e| {
            warn!(message_id, stage = "validate", error = %e, "event validation failed");
        })?;
        debug!(message_id, stage = "validated", user_id = %event.user_id, "event validated");

        let record = NormalizedRecord::enrich(message_id, &event, now);
        debug!(
            message_id,
            stage = "enriched",
            event_timestamp = %record.event_timestamp,
            "event enriched"
        );

        let errors = self
            .row_store
            .insert_rows(&self.staging_table, std::slice::from_ref(&record))
            .await;
        if !errors.is_empty() {
            let reason = errors
                .iter()
                .map(|e| format!("row {}: {}", e.index, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            warn!(message_id, stage = "load", reason = %reason, "staging insert rejected");
            return Err(DomainError::LoadFailed(reason));
        }

        info!(
            message_id,
            stage = "loaded",
            user_id = %record.user_id,
            event_type = %record.event_type,
            "event loaded"
        );
        Ok(record)
    }
}
