//! cdc-bridge library
//!
//! Streams Debezium change events from Kafka topics into ClickHouse, one table
//! per topic, storing each payload verbatim together with its broker
//! provenance.
//!
//! # Crates
//!
//! - `cdc_bridge_core` - routing, filtering, batching and the stream driver
//! - `cdc_bridge_kafka_source` - Kafka consumer behind `MessageSource`
//! - `cdc_bridge_clickhouse_sink` - ClickHouse tables behind `RecordSink`
//!
//! This crate holds the command-line option groups shared by the binary and
//! the helpers that turn them into component configurations.
//!
//! # CLI Usage
//!
//! ```bash
//! # Tail the default topics until Ctrl+C
//! cdc-bridge --kafka-brokers localhost:9092 --clickhouse-url http://localhost:8123
//!
//! # Bounded catch-up run
//! cdc-bridge batch --max-messages 3500 --timeout 60s
//!
//! # Truncate tables and reprocess from the earliest offset
//! cdc-bridge reset
//!
//! # Row counts per mapped table
//! cdc-bridge stats
//! ```

use std::path::PathBuf;
use std::time::Duration;

use cdc_bridge_clickhouse_sink::ClickHouseConfig;
use cdc_bridge_core::{DriverConfig, RunMode, TopicRouter};
use cdc_bridge_kafka_source::{ConsumerConfig, OffsetReset};
use clap::{ArgAction, Parser};

pub mod config;
pub mod report;

use config::{duration_arg, topic_map_arg};

#[derive(Parser, Clone, Debug)]
pub struct KafkaOpts {
    /// Kafka bootstrap servers (comma-separated)
    #[arg(long, default_value = "localhost:9092", env = "KAFKA_BROKERS")]
    pub kafka_brokers: String,

    /// Consumer group ID
    #[arg(long, default_value = "clickhouse-bridge-group", env = "KAFKA_GROUP_ID")]
    pub group_id: String,

    /// Where to start when the group has no committed offsets
    #[arg(long, value_enum, default_value_t = OffsetReset::Earliest)]
    pub auto_offset_reset: OffsetReset,

    /// Commit consumed offsets in the background
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub enable_auto_commit: bool,

    /// Consumer session timeout in milliseconds
    #[arg(long, default_value_t = 6000)]
    pub session_timeout_ms: u64,

    /// Report when the consumer catches up with a partition
    #[arg(long)]
    pub enable_partition_eof: bool,
}

impl From<&KafkaOpts> for ConsumerConfig {
    fn from(opts: &KafkaOpts) -> Self {
        Self {
            brokers: opts.kafka_brokers.clone(),
            group_id: opts.group_id.clone(),
            auto_offset_reset: opts.auto_offset_reset,
            enable_auto_commit: opts.enable_auto_commit,
            session_timeout_ms: opts.session_timeout_ms.to_string(),
            enable_partition_eof: opts.enable_partition_eof,
            ..Default::default()
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct ClickHouseOpts {
    /// ClickHouse HTTP endpoint
    #[arg(long, default_value = "http://localhost:8123", env = "CLICKHOUSE_URL")]
    pub clickhouse_url: String,

    /// ClickHouse username
    #[arg(long, default_value = "default", env = "CLICKHOUSE_USER")]
    pub clickhouse_user: String,

    /// ClickHouse password
    #[arg(long, default_value = "", env = "CLICKHOUSE_PASSWORD", hide_env_values = true)]
    pub clickhouse_password: String,

    /// Database holding the destination tables
    #[arg(long, default_value = "default", env = "CLICKHOUSE_DATABASE")]
    pub clickhouse_database: String,
}

impl From<&ClickHouseOpts> for ClickHouseConfig {
    fn from(opts: &ClickHouseOpts) -> Self {
        Self {
            url: opts.clickhouse_url.clone(),
            user: opts.clickhouse_user.clone(),
            password: opts.clickhouse_password.clone(),
            database: opts.clickhouse_database.clone(),
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct BridgeOpts {
    /// TOML file with a [topics] table mapping topic names to table names
    #[arg(long, value_name = "PATH")]
    pub mapping_file: Option<PathBuf>,

    /// Extra topic=table mapping; repeatable, wins over the mapping file
    #[arg(long = "topic-map", value_name = "TOPIC=TABLE", value_parser = topic_map_arg)]
    pub topic_map: Vec<(String, String)>,

    /// Records per table buffered before a write
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Maximum wait for a single poll (e.g. "1s", "250ms")
    #[arg(long, default_value = "1s", value_parser = duration_arg)]
    pub poll_timeout: Duration,

    /// Log progress every N processed messages (0 disables)
    #[arg(long, default_value_t = 100)]
    pub progress_interval: u64,
}

impl BridgeOpts {
    pub fn router(&self) -> anyhow::Result<TopicRouter> {
        config::build_router(self.mapping_file.as_deref(), &self.topic_map)
    }

    pub fn driver_config(&self, mode: RunMode) -> anyhow::Result<DriverConfig> {
        if self.batch_size == 0 {
            anyhow::bail!("--batch-size must be at least 1");
        }
        if self.poll_timeout.is_zero() {
            anyhow::bail!("--poll-timeout must be greater than zero");
        }
        Ok(DriverConfig {
            mode,
            batch_size: self.batch_size,
            poll_timeout: self.poll_timeout,
            progress_interval: self.progress_interval,
            ..Default::default()
        })
    }
}
