//! Kafka subscription for cdc-bridge.
//!
//! [`KafkaSource`] implements [`cdc_bridge_core::MessageSource`] on top of an
//! rdkafka `StreamConsumer`:
//!
//! - Connectivity check: fetches cluster metadata and reports the topic count
//! - Bounded polls: each poll waits at most the driver's poll timeout
//! - Partition EOF markers and transport errors surface as [`PollEvent`]s
//!   instead of failing the run
//! - Offsets are committed in the background, or once on close when
//!   auto-commit is disabled
//!
//! [`PollEvent`]: cdc_bridge_core::PollEvent

pub mod consumer;
pub mod error;

pub use consumer::{fresh_group_id, ConsumerConfig, KafkaSource, OffsetReset};
pub use error::{Error, Result};
