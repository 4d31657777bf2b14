use chrono::{NaiveDate, Utc};
use common::domain::{DomainError, DomainResult, RowStore, SummaryMerge};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationStatus {
    pub event_date: NaiveDate,
    pub users_summarized: usize,
}

/// Rebuilds the per-user daily summary for one UTC date.
///
/// Every run recomputes the day from staging and overwrites the summary rows
/// for that day, so reruns converge on the same content.
pub struct AggregationService {
    row_store: Arc<dyn RowStore>,
    staging_table: String,
    summary_table: String,
}

impl AggregationService {
    pub fn new(
        row_store: Arc<dyn RowStore>,
        staging_table: impl Into<String>,
        summary_table: impl Into<String>,
    ) -> Self {
        Self {
            row_store,
            staging_table: staging_table.into(),
            summary_table: summary_table.into(),
        }
    }

    /// Aggregate `as_of_date`, or the current UTC date when `None`
    #[instrument(skip(self))]
    pub async fn run_daily_aggregation(
        &self,
        as_of_date: Option<NaiveDate>,
    ) -> DomainResult<AggregationStatus> {
        let event_date = as_of_date.unwrap_or_else(|| Utc::now().date_naive());
        let merge = SummaryMerge {
            staging_table: self.staging_table.clone(),
            summary_table: self.summary_table.clone(),
            event_date,
        };

        info!(event_date = %event_date, "starting daily aggregation");

        self.row_store
            .execute_upsert(&merge)
            .await
            .map_err(into_aggregation_failed)
            .inspect_err(|e| error!(event_date = %event_date, error = %e, "daily aggregation failed"))?;

        let summaries = self
            .row_store
            .fetch_daily_summaries(&self.summary_table, event_date)
            .await
            .map_err(into_aggregation_failed)?;

        let status = AggregationStatus {
            event_date,
            users_summarized: summaries.len(),
        };
        info!(
            event_date = %event_date,
            users_summarized = status.users_summarized,
            "daily aggregation completed"
        );
        Ok(status)
    }
}

fn into_aggregation_failed(err: DomainError) -> DomainError {
    match err {
        DomainError::AggregationFailed(_) => err,
        DomainError::RepositoryError(e) => DomainError::AggregationFailed(e),
        other => DomainError::AggregationFailed(anyhow::anyhow!(other.to_string())),
    }
}
