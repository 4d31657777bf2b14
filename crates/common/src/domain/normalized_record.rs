use crate::domain::raw_event::RawEvent;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Date-times carrying an explicit offset, tried after RFC 3339
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Date-times without an offset, read as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Row appended to the staging table for every transformed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Deterministic row key taken from the originating queue message id,
    /// so a redelivered message maps onto the same staging row.
    pub event_id: String,
    pub user_id: String,
    pub event_type: String,
    pub payload: Option<String>,
    pub event_timestamp: DateTime<Utc>,
    pub ingestion_timestamp: DateTime<Utc>,
}

impl NormalizedRecord {
    /// Enrich a validated event with timestamps.
    ///
    /// `now` is both the ingestion time and the fallback event time, so an
    /// event without a usable timestamp ends up with equal timestamps.
    pub fn enrich(event_id: impl Into<String>, event: &RawEvent, now: DateTime<Utc>) -> Self {
        let event_id = event_id.into();
        let event_timestamp = match event.timestamp.as_deref() {
            Some(raw) => parse_event_timestamp(raw).unwrap_or_else(|| {
                warn!(
                    event_id = %event_id,
                    timestamp = raw,
                    "unparseable event timestamp, using ingestion time"
                );
                now
            }),
            None => now,
        };

        Self {
            event_id,
            user_id: event.user_id.clone(),
            event_type: event.event_type.clone(),
            payload: event.payload.as_ref().map(|payload| payload.to_string()),
            event_timestamp,
            ingestion_timestamp: now,
        }
    }
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts RFC 3339 with any offset, date-times with or without seconds
/// (`Z`, an offset, or nothing, which is taken to already be UTC) and a bare
/// date, which maps to midnight UTC.
pub fn parse_event_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    if let Some(ts) = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
    {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    if let Some(ts) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
    {
        return Some(ts.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

/// One summary row per user and UTC calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummaryRow {
    pub user_id: String,
    pub event_date: NaiveDate,
    pub total_events: u64,
    pub event_types_unique: u64,
}

/// A rejected row reported by the row store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowInsertError {
    pub index: usize,
    pub message: String,
}

/// Idempotent merge of one day of staging data into the summary table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryMerge {
    pub staging_table: String,
    pub summary_table: String,
    pub event_date: NaiveDate,
}

/// Analytical store used for staging rows and daily summaries
/// Infrastructure layer (ClickHouse, in-memory) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Streaming insert. An empty result means every row was accepted.
    async fn insert_rows(&self, table: &str, rows: &[NormalizedRecord]) -> Vec<RowInsertError>;

    /// Insert-or-overwrite summary rows keyed by `(user_id, event_date)`.
    /// Staging duplicates sharing an `event_id` are counted once.
    async fn execute_upsert(&self, merge: &SummaryMerge) -> DomainResult<()>;

    async fn fetch_daily_summaries(
        &self,
        summary_table: &str,
        event_date: NaiveDate,
    ) -> DomainResult<Vec<DailySummaryRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event(timestamp: Option<&str>, payload: Option<serde_json::Value>) -> RawEvent {
        RawEvent {
            user_id: "u1".to_string(),
            event_type: "click".to_string(),
            payload,
            timestamp: timestamp.map(str::to_string),
        }
    }

    #[test]
    fn test_enrich_uses_source_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let record = NormalizedRecord::enrich("7", &event(Some("2024-01-01T10:00:00Z"), None), now);

        assert_eq!(
            record.event_timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(record.ingestion_timestamp, now);
        assert_eq!(record.event_id, "7");
    }

    #[test]
    fn test_enrich_falls_back_to_now_without_timestamp() {
        let now = Utc::now();
        let record = NormalizedRecord::enrich("1", &event(None, None), now);
        assert_eq!(record.event_timestamp, record.ingestion_timestamp);
    }

    #[test]
    fn test_enrich_falls_back_to_now_on_malformed_timestamp() {
        let now = Utc::now();
        let record = NormalizedRecord::enrich("1", &event(Some("yesterday-ish"), None), now);
        assert_eq!(record.event_timestamp, now);
    }

    #[test]
    fn test_enrich_stringifies_payload() {
        let record = NormalizedRecord::enrich(
            "1",
            &event(None, Some(json!({"sku": "A-1", "qty": 2}))),
            Utc::now(),
        );
        assert_eq!(record.payload.as_deref(), Some(r#"{"sku":"A-1","qty":2}"#));
    }

    #[test]
    fn test_parse_event_timestamp_normalizes_offset() {
        let parsed = parse_event_timestamp("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_event_timestamp_accepts_naive_as_utc() {
        let parsed = parse_event_timestamp("2024-01-01T23:59:59.250").unwrap();
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_parse_event_timestamp_accepts_date_only_as_midnight_utc() {
        let parsed = parse_event_timestamp("2024-01-01").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_event_timestamp_accepts_minutes_precision() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_event_timestamp("2024-01-01T10:00Z"), Some(expected));
        assert_eq!(parse_event_timestamp("2024-01-01T10:00"), Some(expected));
        assert_eq!(
            parse_event_timestamp("2024-01-01T12:00+02:00"),
            Some(expected)
        );
    }

    #[test]
    fn test_parse_event_timestamp_rejects_garbage() {
        assert!(parse_event_timestamp("yesterday-ish").is_none());
        assert!(parse_event_timestamp("2024-13-01").is_none());
        assert!(parse_event_timestamp("").is_none());
    }

    #[test]
    fn test_enrich_keeps_date_only_source_day() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let record = NormalizedRecord::enrich("3", &event(Some("2024-01-01"), None), now);
        assert_eq!(
            record.event_timestamp.date_naive(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(record.ingestion_timestamp, now);
    }

    #[test]
    fn test_record_serializes_iso_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = NormalizedRecord::enrich("1", &event(None, None), now);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event_timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(json["payload"], serde_json::Value::Null);
    }
}
