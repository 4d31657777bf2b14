use anyhow::{Context, Result};
use clickhouse::Client;
use tracing::info;

/// Shared handle; cloning reuses the underlying HTTP connection pool
#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
}

impl ClickHouseClient {
    pub fn new(url: &str, database: &str, username: &str, password: &str) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(username)
            .with_password(password)
            .with_compression(clickhouse::Compression::Lz4);

        Self { client }
    }

    pub async fn ping(&self) -> Result<()> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .context("ClickHouse ping failed")?;
        Ok(())
    }

    /// Create the configured database if it is missing
    pub async fn ensure_database(&self, database: &str) -> Result<()> {
        // runs without a database selected since it may not exist yet
        Client::clone(&self.client)
            .with_database("default")
            .query(&format!("CREATE DATABASE IF NOT EXISTS {database}"))
            .execute()
            .await
            .with_context(|| format!("failed to create database {database}"))?;
        info!(database = %database, "ClickHouse database ready");
        Ok(())
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}
