//! Per-table record buffers.

use std::collections::BTreeMap;

use crate::message::StoredRecord;

/// Default number of records per flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Records waiting to be written to one table, in arrival order.
pub type Batch = Vec<StoredRecord>;

/// Groups records by destination table until a size threshold is reached.
///
/// There is no timer: a buffer only empties when it is drained, either because
/// it reached the threshold or because the run is ending.
#[derive(Debug)]
pub struct BatchAccumulator {
    threshold: usize,
    buffers: BTreeMap<String, Batch>,
}

impl BatchAccumulator {
    /// A threshold of zero is treated as one.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            buffers: BTreeMap::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Append a record, creating the table's buffer on first use.
    pub fn append(&mut self, table: &str, record: StoredRecord) {
        match self.buffers.get_mut(table) {
            Some(buffer) => buffer.push(record),
            None => {
                let mut buffer = Vec::with_capacity(self.threshold);
                buffer.push(record);
                self.buffers.insert(table.to_string(), buffer);
            }
        }
    }

    /// True once the table's buffer holds `threshold` records.
    pub fn should_flush(&self, table: &str) -> bool {
        self.len(table) >= self.threshold
    }

    /// Take the table's buffered records, leaving it empty.
    pub fn drain(&mut self, table: &str) -> Batch {
        self.buffers
            .get_mut(table)
            .map(|buffer| std::mem::replace(buffer, Vec::with_capacity(self.threshold)))
            .unwrap_or_default()
    }

    /// Take every non-empty buffer.
    pub fn drain_all(&mut self) -> BTreeMap<String, Batch> {
        std::mem::take(&mut self.buffers)
            .into_iter()
            .filter(|(_, batch)| !batch.is_empty())
            .collect()
    }

    pub fn len(&self, table: &str) -> usize {
        self.buffers.get(table).map_or(0, Vec::len)
    }

    /// Total records buffered across all tables.
    pub fn pending(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}
