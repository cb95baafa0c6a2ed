use chrono::{DateTime, Utc};

/// A message as it comes off the broker.
///
/// Offsets are only unique within `(topic, partition)`. A broker message without
/// a value arrives here with an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(
        topic: impl Into<String>,
        partition: u32,
        offset: u64,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            payload: payload.into(),
        }
    }
}

/// One row in a destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// The source payload, byte for byte
    pub raw_payload: String,
    /// Arrival time at the bridge (not the broker timestamp)
    pub ingested_at: DateTime<Utc>,
    pub source_offset: u64,
    pub source_partition: u32,
}

impl StoredRecord {
    /// Build the record for a kept message, stamped with `ingested_at`.
    pub fn from_message(
        message: &InboundMessage,
        raw_payload: String,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            raw_payload,
            ingested_at,
            source_offset: message.offset,
            source_partition: message.partition,
        }
    }
}
