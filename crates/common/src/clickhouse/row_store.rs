use crate::clickhouse::ClickHouseClient;
use crate::domain::{
    DailySummaryRow, DomainError, DomainResult, NormalizedRecord, RowInsertError, RowStore,
    SummaryMerge,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct StagingRow {
    pub event_id: String,
    pub user_id: String,
    pub event_type: String,
    pub payload: Option<String>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub event_timestamp: DateTime<Utc>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub ingestion_timestamp: DateTime<Utc>,
}

impl From<&NormalizedRecord> for StagingRow {
    fn from(record: &NormalizedRecord) -> Self {
        Self {
            event_id: record.event_id.clone(),
            user_id: record.user_id.clone(),
            event_type: record.event_type.clone(),
            payload: record.payload.clone(),
            event_timestamp: record.event_timestamp,
            ingestion_timestamp: record.ingestion_timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct SummaryRow {
    pub user_id: String,
    #[serde(with = "clickhouse::serde::chrono::date")]
    pub event_date: NaiveDate,
    pub total_events: u64,
    pub event_types_unique: u64,
}

impl From<SummaryRow> for DailySummaryRow {
    fn from(row: SummaryRow) -> Self {
        Self {
            user_id: row.user_id,
            event_date: row.event_date,
            total_events: row.total_events,
            event_types_unique: row.event_types_unique,
        }
    }
}

/// Redelivered messages land on the same `event_id`; `FINAL` reads collapse them.
pub fn staging_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            event_id String,
            user_id String,
            event_type String,
            payload Nullable(String),
            event_timestamp DateTime64(3, 'UTC'),
            ingestion_timestamp DateTime64(3, 'UTC')
        )
        ENGINE = ReplacingMergeTree(ingestion_timestamp)
        ORDER BY event_id"
    )
}

/// Unversioned. A rerun of a day writes rows identical to the previous run.
pub fn summary_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            user_id String,
            event_date Date,
            total_events UInt64,
            event_types_unique UInt64
        )
        ENGINE = ReplacingMergeTree
        PARTITION BY toYYYYMM(event_date)
        ORDER BY (user_id, event_date)"
    )
}

/// Recompute every user's row for one day from deduplicated staging data
pub fn summary_upsert_sql(merge: &SummaryMerge) -> String {
    format!(
        "INSERT INTO {summary} (user_id, event_date, total_events, event_types_unique)
        SELECT
            user_id,
            toDate(?) AS event_date,
            count() AS total_events,
            uniqExact(event_type) AS event_types_unique
        FROM {staging} FINAL
        WHERE toDate(event_timestamp, 'UTC') = toDate(?)
        GROUP BY user_id",
        summary = merge.summary_table,
        staging = merge.staging_table,
    )
}

/// Collapse replaced summary rows so exactly one row per key remains
pub fn summary_optimize_sql(merge: &SummaryMerge) -> String {
    format!(
        "OPTIMIZE TABLE {} PARTITION {} FINAL",
        merge.summary_table,
        partition_id(merge.event_date)
    )
}

fn partition_id(date: NaiveDate) -> u32 {
    date.year() as u32 * 100 + date.month()
}

#[derive(Clone)]
pub struct ClickHouseRowStore {
    client: ClickHouseClient,
}

impl ClickHouseRowStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    /// Create the staging and summary tables if they do not exist yet
    pub async fn ensure_schema(&self, staging_table: &str, summary_table: &str) -> anyhow::Result<()> {
        for ddl in [staging_table_ddl(staging_table), summary_table_ddl(summary_table)] {
            self.client
                .get_client()
                .query(&ddl)
                .execute()
                .await
                .context("failed to apply ClickHouse schema")?;
        }
        info!(staging = %staging_table, summary = %summary_table, "ClickHouse schema ready");
        Ok(())
    }

    async fn write_rows(&self, table: &str, rows: &[StagingRow]) -> anyhow::Result<()> {
        let mut insert = self
            .client
            .get_client()
            .insert::<StagingRow>(table)
            .await
            .context("failed to create ClickHouse inserter")?;

        for row in rows {
            insert
                .write(row)
                .await
                .context("failed to write row to ClickHouse")?;
        }

        insert
            .end()
            .await
            .context("failed to finalize ClickHouse insert")?;
        Ok(())
    }
}

#[async_trait]
impl RowStore for ClickHouseRowStore {
    async fn insert_rows(&self, table: &str, rows: &[NormalizedRecord]) -> Vec<RowInsertError> {
        if rows.is_empty() {
            return Vec::new();
        }

        let staging_rows: Vec<StagingRow> = rows.iter().map(StagingRow::from).collect();

        match self.write_rows(table, &staging_rows).await {
            Ok(()) => {
                debug!(rows_inserted = rows.len(), table = %table, "inserted staging rows");
                Vec::new()
            }
            Err(e) => {
                error!(table = %table, error = %format!("{e:#}"), "staging insert failed");
                // inserts are atomic per request, so every row shares the failure
                (0..rows.len())
                    .map(|index| RowInsertError {
                        index,
                        message: format!("{e:#}"),
                    })
                    .collect()
            }
        }
    }

    async fn execute_upsert(&self, merge: &SummaryMerge) -> DomainResult<()> {
        let date = merge.event_date.to_string();

        self.client
            .get_client()
            .query(&summary_upsert_sql(merge))
            .bind(date.as_str())
            .bind(date.as_str())
            .execute()
            .await
            .context("failed to upsert daily summary")
            .map_err(DomainError::AggregationFailed)?;

        self.client
            .get_client()
            .query(&summary_optimize_sql(merge))
            .execute()
            .await
            .context("failed to collapse daily summary partition")
            .map_err(DomainError::AggregationFailed)?;

        Ok(())
    }

    async fn fetch_daily_summaries(
        &self,
        summary_table: &str,
        event_date: NaiveDate,
    ) -> DomainResult<Vec<DailySummaryRow>> {
        let rows = self
            .client
            .get_client()
            .query(&format!(
                "SELECT ?fields FROM {summary_table} FINAL WHERE event_date = toDate(?) ORDER BY user_id"
            ))
            .bind(event_date.to_string())
            .fetch_all::<SummaryRow>()
            .await
            .context("failed to read daily summaries")?;

        Ok(rows.into_iter().map(DailySummaryRow::from).collect())
    }
}
