use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::filter::DropReason;

/// Counters for one driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Every message taken off the broker, kept or dropped
    pub messages_processed: u64,
    /// Messages that became a stored record
    pub records_kept: u64,
    pub dropped: BTreeMap<DropReason, u64>,
    pub records_written: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    /// Records discarded because their batch write failed
    pub records_lost: u64,
    pub poll_errors: u64,
    pub partition_eofs: u64,
    /// Records written per table
    pub written_by_table: BTreeMap<String, u64>,
}

impl RunStats {
    pub fn record_drop(&mut self, reason: DropReason) {
        *self.dropped.entry(reason).or_insert(0) += 1;
    }

    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }

    pub fn record_flush_success(&mut self, table: &str, records: usize) {
        self.batches_written += 1;
        self.records_written += records as u64;
        *self.written_by_table.entry(table.to_string()).or_insert(0) += records as u64;
    }

    pub fn record_flush_failure(&mut self, records: usize) {
        self.batches_failed += 1;
        self.records_lost += records as u64;
    }

    /// Messages per second over `elapsed`.
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.messages_processed as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} kept={} dropped={} (",
            self.messages_processed,
            self.records_kept,
            self.dropped_total()
        )?;
        let mut first = true;
        for (reason, count) in &self.dropped {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{reason}={count}")?;
            first = false;
        }
        write!(
            f,
            ") written={} batches={} failed_batches={} lost={}",
            self.records_written, self.batches_written, self.batches_failed, self.records_lost
        )
    }
}
