use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream holding accepted raw events
    #[serde(default = "default_events_stream")]
    pub events_stream: String,

    /// Subject the gateway publishes accepted events to
    #[serde(default = "default_ingest_subject")]
    pub ingest_subject: String,

    /// JetStream stream receiving dead-lettered messages
    #[serde(default = "default_dead_letter_stream")]
    pub dead_letter_stream: String,

    #[serde(default = "default_archiver_consumer")]
    pub archiver_consumer: String,

    #[serde(default = "default_transformer_consumer")]
    pub transformer_consumer: String,

    #[serde(default = "default_dead_letter_consumer")]
    pub dead_letter_consumer: String,

    /// Delivery attempts before a message is dead-lettered
    #[serde(default = "default_max_deliver")]
    pub max_deliver: u64,

    /// Redelivery delays in seconds, comma-separated in the environment.
    /// The last value repeats for later attempts.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: Vec<u64>,

    /// Time the broker waits for an ack before redelivering
    #[serde(default = "default_ack_wait_secs")]
    pub ack_wait_secs: u64,

    /// Batch size for consumers
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Object store bucket the archiver writes raw events to
    #[serde(default = "default_raw_bucket")]
    pub raw_bucket: String,

    /// Object store bucket watched for bulk NDJSON uploads
    #[serde(default = "default_uploads_bucket")]
    pub uploads_bucket: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // ClickHouse configuration
    /// ClickHouse HTTP URL
    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,

    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    #[serde(default = "default_clickhouse_password")]
    pub clickhouse_password: String,

    #[serde(default = "default_staging_table")]
    pub staging_table: String,

    #[serde(default = "default_summary_table")]
    pub summary_table: String,

    // HTTP configuration
    #[serde(default = "default_http_bind_address")]
    pub http_bind_address: String,

    // Pipeline behavior
    /// UTC hour at which the daily aggregation runs
    #[serde(default = "default_aggregation_hour_utc")]
    pub aggregation_hour_utc: u32,

    /// Send events failing validation straight to the dead-letter stream
    /// instead of retrying them
    #[serde(default = "default_reject_invalid_events")]
    pub reject_invalid_events: bool,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_events_stream() -> String {
    "events".to_string()
}

fn default_ingest_subject() -> String {
    "events.ingested".to_string()
}

fn default_dead_letter_stream() -> String {
    "events_dlq".to_string()
}

fn default_archiver_consumer() -> String {
    "archiver".to_string()
}

fn default_transformer_consumer() -> String {
    "transformer".to_string()
}

fn default_dead_letter_consumer() -> String {
    "dead-letter-handler".to_string()
}

fn default_max_deliver() -> u64 {
    5
}

fn default_backoff_secs() -> Vec<u64> {
    vec![1, 5, 30]
}

fn default_ack_wait_secs() -> u64 {
    30
}

fn default_nats_batch_size() -> usize {
    30
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_raw_bucket() -> String {
    "raw-events".to_string()
}

fn default_uploads_bucket() -> String {
    "event-uploads".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// ClickHouse defaults
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "shopstream".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_password() -> String {
    String::new()
}

fn default_staging_table() -> String {
    "events_staging".to_string()
}

fn default_summary_table() -> String {
    "daily_user_summary".to_string()
}

fn default_http_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_aggregation_hour_utc() -> u32 {
    23
}

fn default_reject_invalid_events() -> bool {
    true
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "shopstream".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("SHOPSTREAM")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("backoff_secs"),
            )
            .build()?
            .try_deserialize()
    }
}
