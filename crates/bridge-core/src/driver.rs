//! The stream driver: one sequential poll → filter → route → batch → flush loop.
//!
//! ```text
//! INIT → SUBSCRIBED → POLLING ⇄ PROCESSING → DRAINING → STOPPED
//! ```
//!
//! The bounded poll is the only place the loop waits, so cancellation and the
//! time cap are evaluated between polls and never interrupt a flush. Whatever
//! ends the loop, every buffered record is flushed before [`StreamDriver::run`]
//! returns.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, BatchAccumulator, DEFAULT_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::filter::{DropReason, FilterDecision, RecordFilter};
use crate::message::{InboundMessage, StoredRecord};
use crate::router::TopicRouter;
use crate::stats::RunStats;
use crate::traits::{MessageSource, PollEvent, RecordSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Tail the topics until cancelled
    Continuous,
    /// Stop after `max_messages` processed messages, or once a poll comes back
    /// without a message after `timeout` has elapsed, whichever happens first
    Bounded {
        max_messages: u64,
        timeout: Duration,
    },
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Continuous => f.write_str("continuous"),
            RunMode::Bounded {
                max_messages,
                timeout,
            } => write!(
                f,
                "bounded (max {max_messages} messages, timeout {}s)",
                timeout.as_secs()
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub mode: RunMode,
    /// Records per table before a flush
    pub batch_size: usize,
    /// Upper bound on a single poll
    pub poll_timeout: Duration,
    /// Log throughput every this many processed messages (0 disables)
    pub progress_interval: u64,
    /// Empty every mapped table after connectivity checks, before subscribing
    pub truncate_on_start: bool,
    /// Query per-table row counts once stopped
    pub report_table_counts: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Continuous,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_timeout: Duration::from_secs(1),
            progress_interval: 100,
            truncate_on_start: false,
            report_table_counts: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Subscribed,
    Polling,
    Processing,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MessageLimit,
    Timeout,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MessageLimit => f.write_str("message limit reached"),
            StopReason::Timeout => f.write_str("timeout reached"),
            StopReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: RunStats,
    pub stop_reason: StopReason,
    /// Time from subscription to stop
    pub elapsed: Duration,
    /// Row counts read back from the sink; `None` where the query failed
    pub table_counts: BTreeMap<String, Option<u64>>,
}

/// Owns one subscription, one set of buffers and one sink handle.
///
/// Several drivers may run side by side (for example one per topic shard) as
/// long as each gets its own source and sink; only the router is shared.
pub struct StreamDriver<S, K> {
    source: S,
    sink: K,
    router: Arc<TopicRouter>,
    filter: RecordFilter,
    config: DriverConfig,
    accumulator: BatchAccumulator,
    stats: RunStats,
    state: watch::Sender<DriverState>,
}

impl<S, K> StreamDriver<S, K>
where
    S: MessageSource,
    K: RecordSink,
{
    pub fn new(source: S, sink: K, router: Arc<TopicRouter>, config: DriverConfig) -> Self {
        let accumulator = BatchAccumulator::new(config.batch_size);
        let (state, _) = watch::channel(DriverState::Init);
        Self {
            source,
            sink,
            router,
            filter: RecordFilter::new(),
            config,
            accumulator,
            stats: RunStats::default(),
            state,
        }
    }

    /// Observe state transitions from another task.
    pub fn watch_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    /// Run to completion.
    ///
    /// Returns an error only for fatal startup failures, in which case nothing
    /// has been consumed. Once subscribed, every failure is logged and counted
    /// in the returned summary.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary> {
        if let Err(e) = self.init().await {
            error!("Startup failed, nothing consumed: {e}");
            self.transition(DriverState::Stopped);
            return Err(e);
        }

        let topics = self.router.topics();
        info!("Subscribing to topics: {topics:?}");
        if let Err(e) = self.source.subscribe(&topics).await {
            self.transition(DriverState::Stopped);
            return Err(Error::Subscribe(e));
        }
        self.transition(DriverState::Subscribed);

        info!("Streaming in {} mode", self.config.mode);
        let started = Instant::now();
        let stop_reason = self.stream(&cancel, started).await;
        let elapsed = started.elapsed();
        info!("Stopping: {stop_reason}");

        self.drain().await;
        let table_counts = self.shutdown().await;

        info!(
            "Processed {} messages in {:.1}s: {}",
            self.stats.messages_processed,
            elapsed.as_secs_f64(),
            self.stats
        );

        Ok(RunSummary {
            stats: self.stats,
            stop_reason,
            elapsed,
            table_counts,
        })
    }

    async fn init(&mut self) -> Result<()> {
        let topic_count = self
            .source
            .check_connection()
            .await
            .map_err(Error::BrokerUnavailable)?;
        info!("Broker connection successful. Available topics: {topic_count}");

        self.sink
            .check_connection()
            .await
            .map_err(Error::SinkUnavailable)?;
        info!("Sink connection successful");

        let router = Arc::clone(&self.router);
        for table in router.tables() {
            self.sink
                .ensure_table(table)
                .await
                .map_err(|reason| Error::TableProvisioning {
                    table: table.to_string(),
                    reason,
                })?;
            info!("Table {table} created/verified");
        }

        if self.config.truncate_on_start {
            for table in router.tables() {
                self.sink
                    .truncate_table(table)
                    .await
                    .map_err(|reason| Error::TableTruncation {
                        table: table.to_string(),
                        reason,
                    })?;
                info!("Cleared {table}");
            }
        }

        Ok(())
    }

    async fn stream(&mut self, cancel: &CancellationToken, started: Instant) -> StopReason {
        loop {
            if cancel.is_cancelled() {
                return StopReason::Cancelled;
            }
            if self.limit_reached() {
                return StopReason::MessageLimit;
            }

            self.transition(DriverState::Polling);
            match self.source.poll(self.config.poll_timeout).await {
                PollEvent::Empty => {}
                PollEvent::PartitionEof { partition } => {
                    self.stats.partition_eofs += 1;
                    debug!(partition, "End of partition reached");
                }
                PollEvent::Error(e) => {
                    self.stats.poll_errors += 1;
                    warn!("Broker poll error: {e}");
                }
                PollEvent::Message(message) => {
                    self.transition(DriverState::Processing);
                    self.process(message).await;
                    self.stats.messages_processed += 1;
                    self.report_progress(started);

                    if self.limit_reached() {
                        info!(
                            "Reached max messages limit: {}",
                            self.stats.messages_processed
                        );
                        return StopReason::MessageLimit;
                    }
                    continue;
                }
            }

            // Nothing was processed on this poll
            if self.timed_out(started) {
                return StopReason::Timeout;
            }
        }
    }

    async fn process(&mut self, message: InboundMessage) {
        let payload = match self.filter.should_keep(&message.payload) {
            FilterDecision::Keep(text) => text.to_string(),
            FilterDecision::Drop(reason) => {
                debug!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Dropping message: {reason}"
                );
                self.stats.record_drop(reason);
                return;
            }
        };

        let router = Arc::clone(&self.router);
        let Some(table) = router.resolve(&message.topic) else {
            warn!("Unknown topic: {}", message.topic);
            self.stats.record_drop(DropReason::UnknownTopic);
            return;
        };

        let record = StoredRecord::from_message(&message, payload, Utc::now());
        self.accumulator.append(table, record);
        self.stats.records_kept += 1;

        if self.accumulator.should_flush(table) {
            self.flush(table).await;
        }
    }

    async fn flush(&mut self, table: &str) {
        let batch = self.accumulator.drain(table);
        self.write_batch(table, batch).await;
    }

    async fn drain(&mut self) {
        self.transition(DriverState::Draining);
        let remaining = self.accumulator.drain_all();
        if !remaining.is_empty() {
            info!("Flushing {} remaining buffers", remaining.len());
        }
        for (table, batch) in remaining {
            self.write_batch(&table, batch).await;
        }
    }

    /// A failed write is logged and its records are discarded; the loop
    /// carries on.
    async fn write_batch(&mut self, table: &str, batch: Batch) {
        if batch.is_empty() {
            return;
        }

        match self.sink.write_batch(table, &batch).await {
            Ok(()) => {
                self.stats.record_flush_success(table, batch.len());
                info!("Inserted {} records into {table}", batch.len());
            }
            Err(e) => {
                self.stats.record_flush_failure(batch.len());
                error!(
                    table,
                    batch_size = batch.len(),
                    "Error inserting batch, records discarded: {e:#}"
                );
            }
        }
    }

    async fn shutdown(&mut self) -> BTreeMap<String, Option<u64>> {
        if let Err(e) = self.source.close().await {
            warn!("Error closing broker subscription: {e:#}");
        }

        let counts = if self.config.report_table_counts {
            table_counts(&self.sink, &self.router.tables()).await
        } else {
            BTreeMap::new()
        };

        self.transition(DriverState::Stopped);
        counts
    }

    fn limit_reached(&self) -> bool {
        match self.config.mode {
            RunMode::Bounded { max_messages, .. } => {
                self.stats.messages_processed >= max_messages
            }
            RunMode::Continuous => false,
        }
    }

    /// Bounded runs stop once a poll that produced no message comes back
    /// after the time cap.
    fn timed_out(&self, started: Instant) -> bool {
        let RunMode::Bounded { timeout, .. } = self.config.mode else {
            return false;
        };
        if started.elapsed() <= timeout {
            return false;
        }
        info!("Timeout reached ({}s)", timeout.as_secs_f64());
        true
    }

    fn report_progress(&self, started: Instant) {
        let interval = self.config.progress_interval;
        if interval == 0 || self.stats.messages_processed % interval != 0 {
            return;
        }
        let rate = self.stats.throughput(started.elapsed());
        info!(
            "Processed {} messages ({rate:.1} msg/sec), {} kept, {} pending",
            self.stats.messages_processed,
            self.stats.records_kept,
            self.accumulator.pending()
        );
    }

    fn transition(&self, next: DriverState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!("Driver state {current:?} -> {next:?}");
            *current = next;
            true
        });
    }
}

/// Row count per table, `None` where the count query failed.
pub async fn table_counts<K>(sink: &K, tables: &[&str]) -> BTreeMap<String, Option<u64>>
where
    K: RecordSink + ?Sized,
{
    let mut counts = BTreeMap::new();
    for &table in tables {
        let count = match sink.count_rows(table).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Error counting rows in {table}: {e:#}");
                None
            }
        };
        counts.insert(table.to_string(), count);
    }
    counts
}
