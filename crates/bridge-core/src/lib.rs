//! Core of cdc-bridge: moves CDC records from broker topics into analytical tables.
//!
//! This crate provides:
//! - [`TopicRouter`]: fixed topic → table mapping
//! - [`RecordFilter`]: drops empty, malformed and tombstone payloads
//! - [`BatchAccumulator`]: per-table buffers flushed at a size threshold
//! - [`StreamDriver`]: the poll → filter → route → batch → flush loop, in bounded
//!   or continuous mode
//!
//! # Collaborators
//!
//! The broker and the destination store are reached only through the
//! [`MessageSource`] and [`RecordSink`] traits. The Kafka and ClickHouse
//! implementations live in their own crates; [`testing`] has in-memory ones.
//!
//! # Delivery guarantees
//!
//! Delivery is at-least-once up to the broker's offset commits, with one
//! documented exception: when a batch write fails, the records of that batch
//! are logged, counted as lost and not retried.

pub mod batch;
pub mod driver;
pub mod error;
pub mod filter;
pub mod message;
pub mod router;
pub mod stats;
pub mod testing;
pub mod traits;

pub use batch::{Batch, BatchAccumulator, DEFAULT_BATCH_SIZE};
pub use driver::{
    table_counts, DriverConfig, DriverState, RunMode, RunSummary, StopReason, StreamDriver,
};
pub use error::{Error, Result};
pub use filter::{DropReason, FilterDecision, RecordFilter, DELETED_FIELD};
pub use message::{InboundMessage, StoredRecord};
pub use router::TopicRouter;
pub use stats::RunStats;
pub use traits::{MessageSource, PollEvent, RecordSink};
