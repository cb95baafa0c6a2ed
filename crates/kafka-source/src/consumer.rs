use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdc_bridge_core::{InboundMessage, MessageSource, PollEvent};
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message as RdkafkaMessage};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Where a consumer group without committed offsets starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OffsetReset {
    /// Beginning of each partition
    #[default]
    Earliest,
    /// Only messages produced after subscribing
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the Kafka consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    pub group_id: String,
    /// Start position when the group has no committed offsets
    ///
    /// "earliest" is the safe choice for CDC: starting at "latest" silently
    /// skips every change produced before the first subscription.
    pub auto_offset_reset: OffsetReset,
    /// Let librdkafka commit consumed offsets in the background
    ///
    /// When false, consumed offsets are committed once, synchronously, when the
    /// source is closed.
    pub enable_auto_commit: bool,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// Emit an event whenever the consumer catches up with a partition
    pub enable_partition_eof: bool,
    /// How long the connectivity check waits for cluster metadata
    pub metadata_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "clickhouse-bridge-group".to_string(),
            auto_offset_reset: OffsetReset::Earliest,
            enable_auto_commit: true,
            session_timeout_ms: "6000".to_string(),
            enable_partition_eof: false,
            metadata_timeout: Duration::from_secs(10),
        }
    }
}

impl ConsumerConfig {
    /// Switch to a never-used consumer group so the run starts from the
    /// earliest retained offset. The shared group's committed offsets are not
    /// touched.
    pub fn with_fresh_group(mut self, now: DateTime<Utc>) -> Self {
        self.group_id = fresh_group_id(&self.group_id, now);
        self.auto_offset_reset = OffsetReset::Earliest;
        self
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", self.enable_auto_commit.to_string())
            .set("auto.offset.reset", self.auto_offset_reset.as_str())
            .set("session.timeout.ms", &self.session_timeout_ms)
            .set(
                "enable.partition.eof",
                self.enable_partition_eof.to_string(),
            );
        config
    }
}

/// `<base>-reset-<unix seconds>`
pub fn fresh_group_id(base: &str, now: DateTime<Utc>) -> String {
    format!("{base}-reset-{}", now.timestamp())
}

/// Kafka subscription driven one message at a time
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
    config: ConsumerConfig,
    /// At least one message has been handed out since subscribing
    consumed: bool,
}

impl KafkaSource {
    /// Create the consumer. No network traffic happens until the first call
    /// that needs the cluster.
    pub fn new(config: ConsumerConfig) -> Result<Self> {
        if config.brokers.trim().is_empty() {
            return Err(Error::InvalidConfig("no Kafka brokers configured".to_string()));
        }
        if config.group_id.trim().is_empty() {
            return Err(Error::InvalidConfig("consumer group id is empty".to_string()));
        }

        let consumer: StreamConsumer = config
            .client_config()
            .create()
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        Ok(Self {
            consumer: Arc::new(consumer),
            config,
            consumed: false,
        })
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Number of topics the cluster reports.
    pub async fn topic_count(&self) -> Result<usize> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.config.metadata_timeout;
        // fetch_metadata blocks the calling thread
        let count = tokio::task::spawn_blocking(move || {
            consumer
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.topics().len())
        })
        .await
        .map_err(|e| Error::Metadata(e.to_string()))??;
        Ok(count)
    }

    /// Get the underlying consumer (for advanced use cases)
    pub fn inner(&self) -> &StreamConsumer {
        &self.consumer
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn check_connection(&mut self) -> anyhow::Result<usize> {
        Ok(self.topic_count().await?)
    }

    async fn subscribe(&mut self, topics: &[&str]) -> anyhow::Result<()> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| Error::Consumer(format!("Failed to subscribe to topics: {e}")))?;
        info!(
            "Subscribed as group {} ({} offset reset, auto commit {})",
            self.config.group_id, self.config.auto_offset_reset, self.config.enable_auto_commit
        );
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> PollEvent {
        let event = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => PollEvent::Empty,
            Ok(Ok(msg)) => decode_message(&msg),
            Ok(Err(KafkaError::PartitionEOF(partition))) => PollEvent::PartitionEof {
                partition: partition.max(0) as u32,
            },
            Ok(Err(e)) => PollEvent::Error(e.to_string()),
        };
        if matches!(event, PollEvent::Message(_)) {
            self.consumed = true;
        }
        event
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if !self.config.enable_auto_commit && self.consumed {
            self.consumer
                .commit_consumer_state(CommitMode::Sync)
                .map_err(|e| Error::Consumer(format!("Failed to commit offsets: {e}")))?;
            debug!("Committed consumed offsets for group {}", self.config.group_id);
        }
        self.consumer.unsubscribe();
        Ok(())
    }
}

/// Copy the broker message into an owned [`InboundMessage`]. A message with no
/// value becomes an empty payload.
fn decode_message(msg: &BorrowedMessage<'_>) -> PollEvent {
    let Ok(partition) = u32::try_from(msg.partition()) else {
        return PollEvent::Error(format!(
            "Message on {} has invalid partition {}",
            msg.topic(),
            msg.partition()
        ));
    };
    let Ok(offset) = u64::try_from(msg.offset()) else {
        return PollEvent::Error(format!(
            "Message on {}/{partition} has invalid offset {}",
            msg.topic(),
            msg.offset()
        ));
    };

    PollEvent::Message(InboundMessage {
        topic: msg.topic().to_string(),
        partition,
        offset,
        payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fresh_group_id() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            fresh_group_id("clickhouse-bridge-group", now),
            "clickhouse-bridge-group-reset-1704067200"
        );
    }

    #[test]
    fn test_with_fresh_group_forces_earliest() {
        let config = ConsumerConfig {
            auto_offset_reset: OffsetReset::Latest,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let reset = config.with_fresh_group(now);
        assert_eq!(reset.auto_offset_reset, OffsetReset::Earliest);
        assert_eq!(reset.group_id, "clickhouse-bridge-group-reset-1704067200");
    }

    #[test]
    fn test_client_config_values() {
        let config = ConsumerConfig {
            enable_auto_commit: false,
            enable_partition_eof: true,
            ..Default::default()
        };
        let client = config.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(client.get("group.id"), Some("clickhouse-bridge-group"));
        assert_eq!(client.get("enable.auto.commit"), Some("false"));
        assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(client.get("enable.partition.eof"), Some("true"));
    }

    #[test]
    fn test_empty_brokers_rejected() {
        let config = ConsumerConfig {
            brokers: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            KafkaSource::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_connectivity_check() {
        let config = ConsumerConfig {
            brokers: "127.0.0.1:1".to_string(),
            metadata_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let mut source = KafkaSource::new(config).unwrap();
        let result = source.check_connection().await;
        assert!(result.is_err());
    }
}
