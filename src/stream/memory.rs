//! In-process broker
//!
//! `MemoryBroker` keeps append-only partitioned topics and per-group
//! committed offsets behind one mutex. Clients block in `poll` on a
//! condition variable that is signalled on every append and every wakeup.
//!
//! Topics are created on first use with a single partition, mirroring a
//! broker with topic auto-creation enabled. `create_topic` creates a topic
//! with an explicit partition count.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{
    ClientFactory, OffsetMap, Producer, Record, StreamClient, StreamError, StreamResult,
    TopicPartition, Wakeup,
};

/// Default upper bound of records returned by one poll
const DEFAULT_MAX_POLL_RECORDS: usize = 500;

#[derive(Debug, Clone)]
struct StoredRecord {
    key: String,
    value: Vec<u8>,
}

#[derive(Debug, Default)]
struct BrokerState {
    /// topic -> partitions -> records
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    /// (group, partition) -> committed offset
    committed: HashMap<(String, TopicPartition), i64>,
    /// Every commit in arrival order, per group
    commit_log: HashMap<String, Vec<(TopicPartition, i64)>>,
    max_poll_records: usize,
    /// Number of upcoming polls that fail with a transient error
    failing_polls: usize,
    /// Number of upcoming commits that fail with a transient error
    failing_commits: usize,
}

impl BrokerState {
    fn partitions_mut(&mut self, topic: &str) -> &mut Vec<Vec<StoredRecord>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new()])
    }

    fn partition(&self, tp: &TopicPartition) -> Option<&Vec<StoredRecord>> {
        self.topics
            .get(&tp.topic)
            .and_then(|partitions| partitions.get(tp.partition as usize))
    }
}

#[derive(Debug)]
struct BrokerShared {
    state: Mutex<BrokerState>,
    changed: Condvar,
}

impl BrokerShared {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// An in-process, thread-safe broker.
///
/// Cloning yields another handle to the same broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    shared: Arc<BrokerShared>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(BrokerShared {
                state: Mutex::new(BrokerState {
                    max_poll_records: DEFAULT_MAX_POLL_RECORDS,
                    ..BrokerState::default()
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Create a topic with the given number of partitions.
    ///
    /// Has no effect if the topic already exists.
    pub fn create_topic(&self, topic: &str, partitions: u32) {
        let mut state = self.shared.lock();
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
    }

    /// Append a record to partition 0 of a topic and return its offset.
    pub fn publish(&self, topic: &str, key: &str, value: impl Into<Vec<u8>>) -> i64 {
        let offset = {
            let mut state = self.shared.lock();
            let partition = &mut state.partitions_mut(topic)[0];
            partition.push(StoredRecord {
                key: key.to_string(),
                value: value.into(),
            });
            partition.len() as i64 - 1
        };
        self.shared.changed.notify_all();
        offset
    }

    /// All records of a partition, in offset order.
    pub fn records(&self, topic: &str, partition: u32) -> Vec<Record> {
        let state = self.shared.lock();
        let tp = TopicPartition::new(topic, partition);
        state
            .partition(&tp)
            .map(|stored| {
                stored
                    .iter()
                    .enumerate()
                    .map(|(offset, r)| to_record(&tp, offset as i64, r))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The committed offset of a group on a partition.
    pub fn committed(&self, group: &str, tp: &TopicPartition) -> Option<i64> {
        let state = self.shared.lock();
        state.committed.get(&(group.to_string(), tp.clone())).copied()
    }

    /// Every commit issued by a group, in order.
    pub fn commit_log(&self, group: &str) -> Vec<(TopicPartition, i64)> {
        let state = self.shared.lock();
        state.commit_log.get(group).cloned().unwrap_or_default()
    }

    /// Limit the number of records a single poll returns.
    pub fn set_max_poll_records(&self, max: usize) {
        self.shared.lock().max_poll_records = max.max(1);
    }

    /// Make the next `count` polls, on any client, fail with a transient error.
    pub fn inject_poll_failures(&self, count: usize) {
        self.shared.lock().failing_polls = count;
    }

    /// Make the next `count` commits, on any client, fail with a transient
    /// error. Nothing is recorded for a failed commit.
    pub fn inject_commit_failures(&self, count: usize) {
        self.shared.lock().failing_commits = count;
    }

    /// Create a client for a consumer group.
    pub fn client(&self, group: &str) -> MemoryClient {
        MemoryClient {
            waker: Arc::new(MemoryWaker {
                woken: AtomicBool::new(false),
                shared: Arc::clone(&self.shared),
            }),
            shared: Arc::clone(&self.shared),
            group: group.to_string(),
            positions: Vec::new(),
            closed: false,
        }
    }

    /// Create a producer.
    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
        }
    }
}

fn to_record(tp: &TopicPartition, offset: i64, stored: &StoredRecord) -> Record {
    Record {
        topic: tp.topic.clone(),
        partition: tp.partition,
        offset,
        key: stored.key.clone(),
        value: stored.value.clone(),
    }
}

impl ClientFactory for MemoryBroker {
    type Client = MemoryClient;

    fn create(&self, group: &str) -> StreamResult<MemoryClient> {
        Ok(self.client(group))
    }
}

#[derive(Debug)]
struct MemoryWaker {
    woken: AtomicBool,
    shared: Arc<BrokerShared>,
}

impl Wakeup for MemoryWaker {
    fn wakeup(&self) {
        self.woken.store(true, Ordering::SeqCst);
        // Take the lock so a poller between its flag check and its wait
        // cannot miss the notification.
        let _state = self.shared.lock();
        self.shared.changed.notify_all();
    }
}

/// A `StreamClient` over a `MemoryBroker`
#[derive(Debug)]
pub struct MemoryClient {
    shared: Arc<BrokerShared>,
    waker: Arc<MemoryWaker>,
    group: String,
    /// Assigned partitions with their read positions
    positions: Vec<(TopicPartition, i64)>,
    closed: bool,
}

impl MemoryClient {
    /// The consumer group of this client.
    pub fn group(&self) -> &str {
        &self.group
    }

    fn ensure_open(&self) -> StreamResult<()> {
        if self.closed {
            Err(StreamError::Closed)
        } else {
            Ok(())
        }
    }

    fn position_mut(&mut self, tp: &TopicPartition) -> StreamResult<&mut i64> {
        self.positions
            .iter_mut()
            .find(|(assigned, _)| assigned == tp)
            .map(|(_, position)| position)
            .ok_or_else(|| StreamError::NotAssigned(tp.clone()))
    }

    /// Collect up to `max` records at the current positions.
    fn fetch(&mut self, state: &BrokerState) -> Vec<Record> {
        let mut records = Vec::new();
        for (tp, position) in self.positions.iter_mut() {
            let Some(stored) = state.partition(tp) else {
                continue;
            };
            let start = (*position).max(0) as usize;
            for (index, r) in stored.iter().enumerate().skip(start) {
                if records.len() >= state.max_poll_records {
                    break;
                }
                records.push(to_record(tp, index as i64, r));
                *position = index as i64 + 1;
            }
        }
        records
    }
}

impl StreamClient for MemoryClient {
    fn partitions_for(&mut self, topic: &str) -> StreamResult<Vec<TopicPartition>> {
        self.ensure_open()?;
        let mut state = self.shared.lock();
        let count = state.partitions_mut(topic).len() as u32;
        Ok((0..count).map(|p| TopicPartition::new(topic, p)).collect())
    }

    fn assign(&mut self, partitions: &[TopicPartition]) -> StreamResult<()> {
        self.ensure_open()?;
        let state = self.shared.lock();
        self.positions = partitions
            .iter()
            .map(|tp| {
                let committed = state
                    .committed
                    .get(&(self.group.clone(), tp.clone()))
                    .copied()
                    .unwrap_or(0);
                (tp.clone(), committed)
            })
            .collect();
        Ok(())
    }

    fn assignment(&self) -> Vec<TopicPartition> {
        self.positions.iter().map(|(tp, _)| tp.clone()).collect()
    }

    fn seek(&mut self, partition: &TopicPartition, offset: i64) -> StreamResult<()> {
        self.ensure_open()?;
        *self.position_mut(partition)? = offset.max(0);
        Ok(())
    }

    fn position(&self, partition: &TopicPartition) -> StreamResult<i64> {
        self.ensure_open()?;
        self.positions
            .iter()
            .find(|(assigned, _)| assigned == partition)
            .map(|(_, position)| *position)
            .ok_or_else(|| StreamError::NotAssigned(partition.clone()))
    }

    fn end_offset(&mut self, partition: &TopicPartition) -> StreamResult<i64> {
        self.ensure_open()?;
        let state = self.shared.lock();
        Ok(state
            .partition(partition)
            .map(|stored| stored.len() as i64)
            .unwrap_or(0))
    }

    fn poll(&mut self, timeout: Duration) -> StreamResult<Vec<Record>> {
        self.ensure_open()?;
        let deadline = Instant::now() + timeout;
        let shared = Arc::clone(&self.shared);
        let mut state = shared.lock();

        loop {
            if self.waker.woken.swap(false, Ordering::SeqCst) {
                return Err(StreamError::Wakeup);
            }
            if state.failing_polls > 0 {
                state.failing_polls -= 1;
                return Err(StreamError::io("injected poll failure"));
            }

            let records = self.fetch(&state);
            if !records.is_empty() {
                return Ok(records);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            state = shared
                .changed
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn commit_sync(&mut self, offsets: &OffsetMap) -> StreamResult<()> {
        self.ensure_open()?;
        let mut state = self.shared.lock();
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(StreamError::io("injected commit failure"));
        }
        for (tp, offset) in offsets {
            state
                .committed
                .insert((self.group.clone(), tp.clone()), *offset);
            state
                .commit_log
                .entry(self.group.clone())
                .or_default()
                .push((tp.clone(), *offset));
        }
        Ok(())
    }

    fn waker(&self) -> Arc<dyn Wakeup> {
        self.waker.clone()
    }

    fn close(&mut self) {
        self.closed = true;
        self.positions.clear();
    }
}

/// A `Producer` over a `MemoryBroker`
#[derive(Debug, Clone)]
pub struct MemoryProducer {
    broker: MemoryBroker,
}

impl Producer for MemoryProducer {
    fn send(&mut self, topic: &str, key: &str, value: Vec<u8>) -> StreamResult<i64> {
        Ok(self.broker.publish(topic, key, value))
    }
}
