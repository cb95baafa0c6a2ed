use async_trait::async_trait;
use cdc_bridge_core::router::is_valid_table_name;
use cdc_bridge_core::{Batch, RecordSink};
use clickhouse::Client;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema::{count_rows_sql, create_table_sql, truncate_table_sql, CdcRow};

/// Connection settings for the ClickHouse HTTP interface
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    /// HTTP endpoint, e.g. http://localhost:8123
    pub url: String,
    pub user: String,
    pub password: String,
    /// Database holding the destination tables
    pub database: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            user: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
        }
    }
}

/// Writes batches into per-topic MergeTree tables.
///
/// Each batch is a single INSERT, so it either lands in full or not at all.
#[derive(Clone)]
pub struct ClickHouseSink {
    client: Client,
    config: ClickHouseConfig,
}

impl ClickHouseSink {
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::InvalidConfig("ClickHouse URL is empty".to_string()));
        }
        if !is_valid_table_name(&config.database) {
            return Err(Error::InvalidConfig(format!(
                "invalid database name {:?}",
                config.database
            )));
        }

        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.user);
        if !config.password.is_empty() {
            client = client.with_password(&config.password);
        }

        debug!("ClickHouse client for {} (database {})", config.url, config.database);
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    /// Get the underlying client (for advanced use cases)
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.client.query(sql).execute().await?;
        Ok(())
    }

    async fn insert_rows(&self, table: &str, batch: &Batch) -> Result<()> {
        let mut insert = self.client.insert::<CdcRow>(table)?;
        for record in batch {
            insert.write(&CdcRow::from(record)).await?;
        }
        // Dropping `insert` before end() aborts the statement
        insert.end().await?;
        Ok(())
    }
}

fn checked(table: &str) -> Result<&str> {
    if is_valid_table_name(table) {
        Ok(table)
    } else {
        Err(Error::InvalidTable(table.to_string()))
    }
}

#[async_trait]
impl RecordSink for ClickHouseSink {
    async fn check_connection(&self) -> anyhow::Result<()> {
        let one = self.client.query("SELECT 1").fetch_one::<u8>().await?;
        anyhow::ensure!(one == 1, "unexpected reply to SELECT 1: {one}");
        info!("Connected to ClickHouse at {}", self.config.url);
        Ok(())
    }

    async fn ensure_table(&self, table: &str) -> anyhow::Result<()> {
        self.execute(&create_table_sql(checked(table)?)).await?;
        debug!("Table {table} is ready");
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> anyhow::Result<()> {
        self.execute(&truncate_table_sql(checked(table)?)).await?;
        info!("Truncated table {table}");
        Ok(())
    }

    async fn write_batch(&self, table: &str, batch: &Batch) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.insert_rows(checked(table)?, batch).await?;
        Ok(())
    }

    async fn count_rows(&self, table: &str) -> anyhow::Result<u64> {
        let count = self
            .client
            .query(&count_rows_sql(checked(table)?))
            .fetch_one::<u64>()
            .await?;
        Ok(count)
    }
}
