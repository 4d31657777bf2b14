use crate::domain::{
    DailySummaryRow, DomainResult, NormalizedRecord, RowInsertError, RowStore, SummaryMerge,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    staging: HashMap<String, Vec<NormalizedRecord>>,
    summaries: HashMap<String, BTreeMap<(String, NaiveDate), DailySummaryRow>>,
}

/// Process-local `RowStore` used by tests and by local runs without ClickHouse.
///
/// Staging tables are append-only. Reads for aggregation collapse rows that
/// share an `event_id`, keeping the most recently inserted one.
#[derive(Default)]
pub struct InMemoryRowStore {
    tables: Mutex<Tables>,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw staging rows including duplicates, in insertion order
    pub async fn staging_rows(&self, table: &str) -> Vec<NormalizedRecord> {
        let tables = self.tables.lock().await;
        tables.staging.get(table).cloned().unwrap_or_default()
    }
}

fn deduplicated(rows: &[NormalizedRecord]) -> Vec<&NormalizedRecord> {
    let mut latest: HashMap<&str, &NormalizedRecord> = HashMap::new();
    for row in rows {
        latest.insert(row.event_id.as_str(), row);
    }
    latest.into_values().collect()
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn insert_rows(&self, table: &str, rows: &[NormalizedRecord]) -> Vec<RowInsertError> {
        let mut tables = self.tables.lock().await;
        tables
            .staging
            .entry(table.to_string())
            .or_default()
            .extend_from_slice(rows);
        Vec::new()
    }

    async fn execute_upsert(&self, merge: &SummaryMerge) -> DomainResult<()> {
        let mut tables = self.tables.lock().await;

        let mut per_user: BTreeMap<String, (u64, BTreeSet<String>)> = BTreeMap::new();
        if let Some(rows) = tables.staging.get(&merge.staging_table) {
            for row in deduplicated(rows) {
                if row.event_timestamp.date_naive() != merge.event_date {
                    continue;
                }
                let entry = per_user.entry(row.user_id.clone()).or_default();
                entry.0 += 1;
                entry.1.insert(row.event_type.clone());
            }
        }

        let summary = tables
            .summaries
            .entry(merge.summary_table.clone())
            .or_default();
        for (user_id, (total_events, event_types)) in per_user {
            summary.insert(
                (user_id.clone(), merge.event_date),
                DailySummaryRow {
                    user_id,
                    event_date: merge.event_date,
                    total_events,
                    event_types_unique: event_types.len() as u64,
                },
            );
        }

        Ok(())
    }

    async fn fetch_daily_summaries(
        &self,
        summary_table: &str,
        event_date: NaiveDate,
    ) -> DomainResult<Vec<DailySummaryRow>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .summaries
            .get(summary_table)
            .map(|rows| {
                rows.values()
                    .filter(|row| row.event_date == event_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
