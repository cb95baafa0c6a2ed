use std::time::Duration;

use cdc_bridge::{BridgeOpts, ClickHouseOpts, KafkaOpts};
use cdc_bridge_clickhouse_sink::ClickHouseConfig;
use cdc_bridge_core::RunMode;
use cdc_bridge_kafka_source::{ConsumerConfig, OffsetReset};
use clap::Parser;

#[test]
fn test_kafka_opts_defaults() {
    let opts = KafkaOpts::try_parse_from(["cdc-bridge"]).unwrap();
    assert_eq!(opts.auto_offset_reset, OffsetReset::Earliest);
    assert!(opts.enable_auto_commit);
    assert_eq!(opts.session_timeout_ms, 6000);
    assert!(!opts.enable_partition_eof);
}

#[test]
fn test_kafka_opts_to_consumer_config() {
    let opts = KafkaOpts::try_parse_from([
        "cdc-bridge",
        "--kafka-brokers",
        "kafka-1:9092,kafka-2:9092",
        "--group-id",
        "analytics",
        "--auto-offset-reset",
        "latest",
        "--enable-auto-commit",
        "false",
        "--session-timeout-ms",
        "10000",
    ])
    .unwrap();

    let config = ConsumerConfig::from(&opts);
    assert_eq!(config.brokers, "kafka-1:9092,kafka-2:9092");
    assert_eq!(config.group_id, "analytics");
    assert_eq!(config.auto_offset_reset, OffsetReset::Latest);
    assert!(!config.enable_auto_commit);
    assert_eq!(config.session_timeout_ms, "10000");
}

#[test]
fn test_clickhouse_opts_to_config() {
    let opts = ClickHouseOpts {
        clickhouse_url: "http://clickhouse:8123".to_string(),
        clickhouse_user: "bridge".to_string(),
        clickhouse_password: "secret".to_string(),
        clickhouse_database: "cdc".to_string(),
    };

    let config = ClickHouseConfig::from(&opts);
    assert_eq!(config.url, "http://clickhouse:8123");
    assert_eq!(config.user, "bridge");
    assert_eq!(config.password, "secret");
    assert_eq!(config.database, "cdc");
}

#[test]
fn test_bridge_opts_defaults() {
    let opts = BridgeOpts::try_parse_from(["cdc-bridge"]).unwrap();
    assert_eq!(opts.batch_size, 100);
    assert_eq!(opts.poll_timeout, Duration::from_secs(1));
    assert_eq!(opts.progress_interval, 100);
    assert!(opts.mapping_file.is_none());
    assert!(opts.topic_map.is_empty());

    let router = opts.router().unwrap();
    assert_eq!(router.len(), 3);
}

#[test]
fn test_repeated_topic_map_flags() {
    let opts = BridgeOpts::try_parse_from([
        "cdc-bridge",
        "--topic-map",
        "pg.public.users=pg_users",
        "--topic-map",
        "pg.public.orders=pg_orders",
    ])
    .unwrap();

    let router = opts.router().unwrap();
    assert_eq!(router.tables(), vec!["pg_orders", "pg_users"]);
}

#[test]
fn test_malformed_topic_map_rejected_by_parser() {
    let result = BridgeOpts::try_parse_from(["cdc-bridge", "--topic-map", "no-equals-sign"]);
    assert!(result.is_err());
}

#[test]
fn test_driver_config_from_opts() {
    let opts = BridgeOpts::try_parse_from([
        "cdc-bridge",
        "--batch-size",
        "250",
        "--poll-timeout",
        "250ms",
        "--progress-interval",
        "0",
    ])
    .unwrap();

    let mode = RunMode::Bounded {
        max_messages: 3500,
        timeout: Duration::from_secs(60),
    };
    let config = opts.driver_config(mode).unwrap();
    assert_eq!(config.mode, mode);
    assert_eq!(config.batch_size, 250);
    assert_eq!(config.poll_timeout, Duration::from_millis(250));
    assert_eq!(config.progress_interval, 0);
    assert!(!config.truncate_on_start);
}

#[test]
fn test_zero_batch_size_rejected() {
    let opts = BridgeOpts::try_parse_from(["cdc-bridge", "--batch-size", "0"]).unwrap();
    assert!(opts.driver_config(RunMode::Continuous).is_err());
}
