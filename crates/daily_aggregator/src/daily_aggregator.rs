use crate::domain::AggregationService;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use shopstream_runner::{AppProcess, ProcessFuture};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// First `hour:00:00` UTC strictly after `now`
pub fn next_run_after(now: DateTime<Utc>, hour_utc: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour_utc.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Runs the aggregation once a day for the then-current UTC date
pub struct DailyAggregator {
    service: Arc<AggregationService>,
    hour_utc: u32,
}

impl DailyAggregator {
    pub fn new(service: Arc<AggregationService>, hour_utc: u32) -> Self {
        Self { service, hour_utc }
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.hour_utc);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next, "daily aggregation scheduled");

            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("stopping daily aggregation scheduler");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }

            // a failed day is logged and retried on the next schedule
            if let Err(e) = self.service.run_daily_aggregation(None).await {
                error!(error = %e, "scheduled daily aggregation failed");
            }
        }
    }

    pub fn into_runner_process(self) -> (&'static str, AppProcess) {
        let process: AppProcess =
            Box::new(move |ctx: CancellationToken| -> ProcessFuture { Box::pin(self.run(ctx)) });
        ("daily-aggregator", process)
    }
}
