//! Collaborator traits for the broker and the destination store.
//!
//! The driver is generic over both, so the Kafka/ClickHouse implementations and
//! the in-memory ones in [`crate::testing`] are statically dispatched:
//!
//! ```ignore
//! let driver = StreamDriver::new(kafka_source, clickhouse_sink, router, config);
//! let summary = driver.run(cancel).await?;
//! ```

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::batch::Batch;
use crate::message::InboundMessage;

/// Result of one bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Message(InboundMessage),
    /// Nothing arrived before the timeout
    Empty,
    /// The consumer reached the current end of a partition
    PartitionEof { partition: u32 },
    /// Transient broker or decode error; the loop keeps going
    Error(String),
}

/// Subscription to the broker.
#[async_trait]
pub trait MessageSource: Send {
    /// Prove the broker is reachable. Returns the number of visible topics.
    async fn check_connection(&mut self) -> Result<usize>;

    /// Subscribe to all `topics` in one call.
    async fn subscribe(&mut self, topics: &[&str]) -> Result<()>;

    /// Wait at most `timeout` for the next event.
    async fn poll(&mut self, timeout: Duration) -> PollEvent;

    /// Release the subscription. Implementations that manage offsets by hand
    /// commit what has been consumed here.
    async fn close(&mut self) -> Result<()>;
}

/// Append-only destination store.
#[async_trait]
pub trait RecordSink: Send {
    /// Prove the store is reachable.
    async fn check_connection(&self) -> Result<()>;

    /// Create the table if it does not exist. Must be idempotent.
    async fn ensure_table(&self, table: &str) -> Result<()>;

    /// Remove every row from the table.
    async fn truncate_table(&self, table: &str) -> Result<()>;

    /// Insert the whole batch in one call. No partial success is reported:
    /// either every record was accepted or the call fails.
    async fn write_batch(&self, table: &str, batch: &Batch) -> Result<()>;

    /// Current row count of the table.
    async fn count_rows(&self, table: &str) -> Result<u64>;
}
