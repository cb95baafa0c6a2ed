//! In-memory [`MessageSource`] and [`RecordSink`] for exercising the driver
//! without a broker or a database.
//!
//! Both types hand out cheap clones that share state, so a test can keep one
//! clone for assertions after moving the other into the driver.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::batch::Batch;
use crate::message::{InboundMessage, StoredRecord};
use crate::traits::{MessageSource, PollEvent, RecordSink};

type Generator = Box<dyn FnMut(u64) -> InboundMessage + Send>;

#[derive(Default)]
struct SourceState {
    events: VecDeque<PollEvent>,
    generator: Option<Generator>,
    delivered: u64,
    polls: u64,
    subscribed: Vec<String>,
    closed: bool,
    unreachable: bool,
    cancel_when_exhausted: Option<CancellationToken>,
}

/// Scripted broker subscription.
///
/// Queued events are returned first. After that the optional generator produces
/// an endless stream of messages; without one every poll is empty (and, if
/// configured, cancels a token so continuous runs can finish).
#[derive(Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source preloaded with `messages`.
    pub fn with_messages(messages: impl IntoIterator<Item = InboundMessage>) -> Self {
        let source = Self::new();
        for message in messages {
            source.push(PollEvent::Message(message));
        }
        source
    }

    pub fn push(&self, event: PollEvent) {
        self.state().events.push_back(event);
    }

    /// Produce `f(n)` for the n-th generated message once the queue is empty.
    pub fn with_generator(self, f: impl FnMut(u64) -> InboundMessage + Send + 'static) -> Self {
        self.state().generator = Some(Box::new(f));
        self
    }

    /// Cancel `token` on the first poll that finds nothing to deliver.
    pub fn cancel_when_exhausted(self, token: CancellationToken) -> Self {
        self.state().cancel_when_exhausted = Some(token);
        self
    }

    pub fn set_unreachable(&self) {
        self.state().unreachable = true;
    }

    /// Messages handed to the driver so far.
    pub fn delivered(&self) -> u64 {
        self.state().delivered
    }

    pub fn polls(&self) -> u64 {
        self.state().polls
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.state().subscribed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn state(&self) -> MutexGuard<'_, SourceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn check_connection(&mut self) -> Result<usize> {
        let state = self.state();
        if state.unreachable {
            bail!("broker is unreachable");
        }
        Ok(state.subscribed.len())
    }

    async fn subscribe(&mut self, topics: &[&str]) -> Result<()> {
        self.state().subscribed = topics.iter().map(|t| t.to_string()).collect();
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> PollEvent {
        let event = {
            let mut state = self.state();
            state.polls += 1;
            let next = match state.events.pop_front() {
                Some(event) => Some(event),
                None => {
                    let n = state.delivered;
                    state.generator.as_mut().map(|f| PollEvent::Message(f(n)))
                }
            };
            if matches!(next, Some(PollEvent::Message(_))) {
                state.delivered += 1;
            }
            if next.is_none() {
                if let Some(token) = &state.cancel_when_exhausted {
                    token.cancel();
                }
            }
            next
        };

        match event {
            Some(event) => event,
            None => {
                // An empty poll costs its full timeout, like a real broker.
                tokio::time::sleep(timeout).await;
                PollEvent::Empty
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct SinkState {
    tables: BTreeMap<String, Vec<StoredRecord>>,
    /// (table, records) for every write call, failed ones included
    writes: Vec<(String, usize)>,
    failing_writes: BTreeSet<usize>,
    failed_writes: usize,
    unreachable: bool,
    failing_tables: BTreeSet<String>,
    create_calls: usize,
    truncate_calls: usize,
}

/// Append-only table store kept in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `index`-th write call (0-based) fail.
    pub fn fail_write(&self, index: usize) {
        self.state().failing_writes.insert(index);
    }

    pub fn set_unreachable(&self) {
        self.state().unreachable = true;
    }

    /// Make table creation fail for `table`.
    pub fn fail_table_creation(&self, table: &str) {
        self.state().failing_tables.insert(table.to_string());
    }

    /// Sizes of the batches that were written successfully, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        let state = self.state();
        state
            .writes
            .iter()
            .enumerate()
            .filter(|(i, _)| !state.failing_writes.contains(i))
            .map(|(_, (_, n))| *n)
            .collect()
    }

    pub fn write_calls(&self) -> usize {
        self.state().writes.len()
    }

    pub fn failed_writes(&self) -> usize {
        self.state().failed_writes
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRecord> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// Rows across every table.
    pub fn total_rows(&self) -> usize {
        self.state().tables.values().map(Vec::len).sum()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state().tables.keys().cloned().collect()
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    pub fn truncate_calls(&self) -> usize {
        self.state().truncate_calls
    }

    /// Put rows into a table directly, bypassing the driver.
    pub fn seed(&self, table: &str, rows: Vec<StoredRecord>) {
        self.state()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn check_connection(&self) -> Result<()> {
        if self.state().unreachable {
            bail!("sink is unreachable");
        }
        Ok(())
    }

    async fn ensure_table(&self, table: &str) -> Result<()> {
        let mut state = self.state();
        state.create_calls += 1;
        if state.failing_tables.contains(table) {
            bail!("cannot create table {table}");
        }
        state.tables.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        let mut state = self.state();
        state.truncate_calls += 1;
        match state.tables.get_mut(table) {
            Some(rows) => {
                rows.clear();
                Ok(())
            }
            None => bail!("table {table} does not exist"),
        }
    }

    async fn write_batch(&self, table: &str, batch: &Batch) -> Result<()> {
        let mut state = self.state();
        let index = state.writes.len();
        state.writes.push((table.to_string(), batch.len()));
        if state.failing_writes.contains(&index) {
            state.failed_writes += 1;
            bail!("simulated write failure for {table}");
        }
        match state.tables.get_mut(table) {
            Some(rows) => {
                rows.extend(batch.iter().cloned());
                Ok(())
            }
            None => bail!("table {table} does not exist"),
        }
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        match self.state().tables.get(table) {
            Some(rows) => Ok(rows.len() as u64),
            None => bail!("table {table} does not exist"),
        }
    }
}

/// A well-formed CDC document for `topic` at `offset`.
pub fn document(topic: &str, partition: u32, offset: u64) -> InboundMessage {
    let payload = format!(r#"{{"_id": "{offset:024x}", "seq": {offset}, "source": "{topic}"}}"#);
    InboundMessage::new(topic, partition, offset, payload)
}

/// A delete event for `topic` at `offset`.
pub fn tombstone(topic: &str, partition: u32, offset: u64) -> InboundMessage {
    let payload = format!(r#"{{"_id": "{offset:024x}", "__deleted": true}}"#);
    InboundMessage::new(topic, partition, offset, payload)
}
