//! Command-line interface for cdc-bridge
//!
//! # Usage Examples
//!
//! ## Continuous
//! ```bash
//! # Tail the default e-commerce topics until Ctrl+C
//! cdc-bridge \
//!   --kafka-brokers localhost:9092 \
//!   --clickhouse-url http://localhost:8123 \
//!   run
//! ```
//!
//! ## Bounded
//! ```bash
//! # Stop after 3500 messages, or once idle past 60 seconds
//! cdc-bridge batch --max-messages 3500 --timeout 60s
//!
//! # Custom mapping
//! cdc-bridge --mapping-file topics.toml --topic-map pg.public.users=pg_users batch
//! ```
//!
//! ## Reset
//! ```bash
//! # Truncate mapped tables, then reread every topic with a fresh consumer group
//! cdc-bridge reset --max-messages 5000 --timeout 120s
//! ```
//!
//! ## Stats
//! ```bash
//! cdc-bridge stats
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cdc_bridge::config::duration_arg;
use cdc_bridge::report::{SummaryReport, TableCountsReport};
use cdc_bridge::{BridgeOpts, ClickHouseOpts, KafkaOpts};
use cdc_bridge_clickhouse_sink::ClickHouseSink;
use cdc_bridge_core::{table_counts, RecordSink, RunMode, StreamDriver, TopicRouter};
use cdc_bridge_kafka_source::{ConsumerConfig, KafkaSource};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cdc-bridge")]
#[command(about = "Stream Debezium CDC topics from Kafka into ClickHouse tables")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    kafka: KafkaOpts,

    #[command(flatten)]
    clickhouse: ClickHouseOpts,

    #[command(flatten)]
    bridge: BridgeOpts,

    /// Defaults to `run`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream continuously until interrupted
    Run,

    /// Stream until a message cap or an idle timeout is reached
    Batch {
        /// Stop after this many processed messages
        #[arg(long, default_value_t = 3500)]
        max_messages: u64,

        /// Stop on the first idle poll after this long (e.g. "60s", "5m")
        #[arg(long, default_value = "60s", value_parser = duration_arg)]
        timeout: Duration,
    },

    /// Truncate mapped tables and reprocess every topic from the beginning
    Reset {
        /// Stop after this many processed messages
        #[arg(long, default_value_t = 5000)]
        max_messages: u64,

        /// Stop on the first idle poll after this long (e.g. "120s", "5m")
        #[arg(long, default_value = "120s", value_parser = duration_arg)]
        timeout: Duration,
    },

    /// Print row counts of the mapped tables
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let router = Arc::new(cli.bridge.router()?);
    let sink = ClickHouseSink::new((&cli.clickhouse).into())
        .context("Invalid ClickHouse configuration")?;
    info!("Topic mapping: {:?}", router.routes().collect::<Vec<_>>());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            run_stream(&cli.kafka, &cli.bridge, router, sink, RunMode::Continuous, false).await
        }
        Commands::Batch {
            max_messages,
            timeout,
        } => {
            let mode = RunMode::Bounded {
                max_messages,
                timeout,
            };
            run_stream(&cli.kafka, &cli.bridge, router, sink, mode, false).await
        }
        Commands::Reset {
            max_messages,
            timeout,
        } => {
            let mode = RunMode::Bounded {
                max_messages,
                timeout,
            };
            run_stream(&cli.kafka, &cli.bridge, router, sink, mode, true).await
        }
        Commands::Stats => run_stats(&router, &sink).await,
    }
}

async fn run_stream(
    kafka: &KafkaOpts,
    bridge: &BridgeOpts,
    router: Arc<TopicRouter>,
    sink: ClickHouseSink,
    mode: RunMode,
    reset: bool,
) -> anyhow::Result<()> {
    let mut consumer_config = ConsumerConfig::from(kafka);
    if reset {
        consumer_config = consumer_config.with_fresh_group(Utc::now());
        info!(
            "Reset run: truncating mapped tables, reading with fresh group {}",
            consumer_config.group_id
        );
    }
    let source = KafkaSource::new(consumer_config).context("Failed to create Kafka consumer")?;

    let mut driver_config = bridge.driver_config(mode)?;
    driver_config.truncate_on_start = reset;

    let cancel = CancellationToken::new();
    setup_shutdown_handler(cancel.clone());

    let summary = StreamDriver::new(source, sink, router, driver_config)
        .run(cancel)
        .await?;

    print!("{}", SummaryReport(&summary));
    Ok(())
}

async fn run_stats(router: &TopicRouter, sink: &ClickHouseSink) -> anyhow::Result<()> {
    sink.check_connection()
        .await
        .context("ClickHouse is unreachable")?;
    let counts = table_counts(sink, &router.tables()).await;
    print!("{}", TableCountsReport(&counts));
    Ok(())
}

/// Cancel the run on Ctrl+C. The driver flushes buffered records before
/// returning.
fn setup_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt signal (Ctrl+C), stopping");
            cancel.cancel();
        }
    });
}
