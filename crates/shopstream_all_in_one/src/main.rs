mod config;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use common::clickhouse::{ClickHouseClient, ClickHouseRowStore};
use common::domain::{BlobArchive, RowStore};
use common::nats::{DeliveryPolicy, NatsClient};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use config::ServiceConfig;
use daily_aggregator::daily_aggregator::DailyAggregator;
use daily_aggregator::domain::AggregationService;
use event_worker::event_worker::{EventWorker, EventWorkerConfig};
use ingest_gateway::ingest_gateway::{IngestGateway, IngestGatewayConfig};
use shopstream_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "shopstream", about = "E-commerce event pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway, workers and aggregation scheduler (default)
    Serve,
    /// Run one daily aggregation and exit
    Aggregate {
        /// UTC date to aggregate (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    debug!("Configuration: {:?}", config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, telemetry_providers).await,
        Command::Aggregate { date } => aggregate_once(config, telemetry_providers, date).await,
    }
}

async fn serve(config: ServiceConfig, telemetry_providers: Option<TelemetryProviders>) {
    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting shopstream service"
    );

    let (nats_client, row_store) = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {:#}", e);
            std::process::exit(1);
        }
    };

    let archive: Arc<dyn BlobArchive> = Arc::new(nats_client.create_blob_archive());
    let row_store: Arc<dyn RowStore> = row_store;

    let ingest_gateway = IngestGateway::new(
        &nats_client,
        archive.clone(),
        IngestGatewayConfig {
            bind_address: config.http_bind_address.clone(),
            ingest_subject: config.ingest_subject.clone(),
            uploads_bucket: config.uploads_bucket.clone(),
        },
    );

    let event_worker = match EventWorker::new(
        &nats_client,
        archive,
        row_store.clone(),
        build_event_worker_config(&config),
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize event worker: {:#}", e);
            std::process::exit(1);
        }
    };

    let aggregation_service = Arc::new(AggregationService::new(
        row_store,
        config.staging_table.clone(),
        config.summary_table.clone(),
    ));
    let daily_aggregator = DailyAggregator::new(aggregation_service, config.aggregation_hour_utc);

    let mut runner = Runner::new();

    for (name, process) in ingest_gateway.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }
    for (name, process) in event_worker.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }
    let (name, process) = daily_aggregator.into_runner_process();
    runner = runner.with_named_process(name, process);

    runner = runner
        .with_closer("nats", move || async move {
            if let Ok(client) = Arc::try_unwrap(nats_client) {
                client.close().await?;
            }
            Ok::<(), anyhow::Error>(())
        })
        .with_closer("telemetry", move || async move {
            shutdown_telemetry(telemetry_providers);
            Ok::<(), anyhow::Error>(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn aggregate_once(
    config: ServiceConfig,
    telemetry_providers: Option<TelemetryProviders>,
    date: Option<NaiveDate>,
) {
    let exit_code = match run_aggregation(&config, date).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Daily aggregation failed: {:#}", e);
            1
        }
    };

    shutdown_telemetry(telemetry_providers);
    std::process::exit(exit_code);
}

async fn run_aggregation(config: &ServiceConfig, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let row_store = initialize_row_store(config).await?;
    let service = AggregationService::new(
        row_store,
        config.staging_table.clone(),
        config.summary_table.clone(),
    );

    let status = service.run_daily_aggregation(date).await?;
    info!(
        event_date = %status.event_date,
        users_summarized = status.users_summarized,
        "Daily aggregation complete"
    );
    Ok(())
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<(Arc<NatsClient>, Arc<ClickHouseRowStore>)> {
    let row_store = initialize_row_store(config).await?;

    info!("Initializing NATS...");
    let nats_client = Arc::new(
        NatsClient::connect(
            &config.nats_url,
            Duration::from_secs(config.startup_timeout_secs),
        )
        .await?,
    );
    nats_client
        .ensure_stream(&config.events_stream, "Accepted raw e-commerce events")
        .await?;
    nats_client
        .ensure_stream(
            &config.dead_letter_stream,
            "Messages that exhausted their delivery budget",
        )
        .await?;

    Ok((nats_client, row_store))
}

async fn initialize_row_store(config: &ServiceConfig) -> anyhow::Result<Arc<ClickHouseRowStore>> {
    info!("Initializing ClickHouse...");
    let client = ClickHouseClient::new(
        &config.clickhouse_url,
        &config.clickhouse_database,
        &config.clickhouse_username,
        &config.clickhouse_password,
    );
    client.ensure_database(&config.clickhouse_database).await?;
    client.ping().await?;

    let row_store = ClickHouseRowStore::new(client);
    row_store
        .ensure_schema(&config.staging_table, &config.summary_table)
        .await?;
    Ok(Arc::new(row_store))
}

fn build_event_worker_config(config: &ServiceConfig) -> EventWorkerConfig {
    EventWorkerConfig {
        stream_name: config.events_stream.clone(),
        dead_letter_stream: config.dead_letter_stream.clone(),
        archiver_consumer: config.archiver_consumer.clone(),
        transformer_consumer: config.transformer_consumer.clone(),
        dead_letter_consumer: config.dead_letter_consumer.clone(),
        batch_size: config.nats_batch_size,
        batch_wait: Duration::from_secs(config.nats_batch_wait_secs),
        ack_wait: Duration::from_secs(config.ack_wait_secs),
        delivery_policy: DeliveryPolicy::from_secs(config.max_deliver, &config.backoff_secs),
        raw_bucket: config.raw_bucket.clone(),
        staging_table: config.staging_table.clone(),
        reject_invalid_events: config.reject_invalid_events,
    }
}
