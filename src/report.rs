//! Human-readable run reports printed by the CLI.

use std::collections::BTreeMap;
use std::fmt;

use cdc_bridge_core::RunSummary;

/// Multi-line run summary.
pub struct SummaryReport<'a>(pub &'a RunSummary);

impl fmt::Display for SummaryReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.0;
        let stats = &summary.stats;
        writeln!(f, "=== Run summary ===")?;
        writeln!(f, "Stopped: {}", summary.stop_reason)?;
        writeln!(
            f,
            "Elapsed: {:.1}s ({:.1} msg/sec)",
            summary.elapsed.as_secs_f64(),
            stats.throughput(summary.elapsed)
        )?;
        writeln!(f, "Messages processed: {}", stats.messages_processed)?;
        writeln!(f, "Records kept: {}", stats.records_kept)?;
        write!(f, "Dropped: {}", stats.dropped_total())?;
        if !stats.dropped.is_empty() {
            let reasons: Vec<String> = stats
                .dropped
                .iter()
                .map(|(reason, count)| format!("{reason}={count}"))
                .collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Batches written: {} ({} records), failed: {} ({} records lost)",
            stats.batches_written, stats.records_written, stats.batches_failed, stats.records_lost
        )?;
        if stats.poll_errors > 0 || stats.partition_eofs > 0 {
            writeln!(
                f,
                "Broker events: {} poll errors, {} partition EOFs",
                stats.poll_errors, stats.partition_eofs
            )?;
        }
        if !summary.table_counts.is_empty() {
            write!(f, "{}", TableCountsReport(&summary.table_counts))?;
        }
        Ok(())
    }
}

/// Row count per table, `unavailable` where the count query failed.
pub struct TableCountsReport<'a>(pub &'a BTreeMap<String, Option<u64>>);

impl fmt::Display for TableCountsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Table counts:")?;
        for (table, count) in self.0 {
            match count {
                Some(count) => writeln!(f, "  {table}: {count} records")?,
                None => writeln!(f, "  {table}: unavailable")?,
            }
        }
        Ok(())
    }
}
