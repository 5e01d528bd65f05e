//! Shared fixtures for the replication integration suites
//!
//! - `RecordingHandler`: an engine whose state is the set of applied keys
//! - `FailingRequester` / `CountingRequester`: on-demand snapshot doubles
//! - node builders over a shared `MemoryBroker`

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use aeroha::snapshot::{SnapshotError, SnapshotResult};
use aeroha::stream::memory::{MemoryBroker, MemoryProducer};
use aeroha::{
    ControlMessage, HandlerError, HandlerResult, Item, MemorySnapshotStore, ProcessingHandler,
    Producer, ReplicationConfig, ReplicationConsumer, Role, SideEffect, SnapshotCoordinator,
    SnapshotInfo, SnapshotRequester, SnapshotStore, StoredSnapshotRequester,
};
use serde_json::json;

pub type TestConsumer = ReplicationConsumer<MemoryBroker, RecordingHandler, MemoryProducer>;

// =============================================================================
// Recording handler
// =============================================================================

/// Everything the engine saw, in order
#[derive(Debug, Default)]
pub struct Journal {
    /// Items applied through `process`/`process_with_snapshot`
    pub processed: Vec<(String, Role)>,
    /// Keys carried by side effects applied on a replica
    pub side_effects: Vec<String>,
    /// Engine state: keys of every applied item
    pub state: BTreeSet<String>,
    pub snapshots_taken: usize,
    /// `offset_during_snapshot` of every snapshot loaded
    pub restored_from: Vec<i64>,
    pub stopped: bool,
}

impl Journal {
    pub fn processed_keys(&self) -> Vec<String> {
        self.processed.iter().map(|(key, _)| key.clone()).collect()
    }
}

/// Engine double: applies items by recording their key.
///
/// As leader it emits one side effect carrying the item key, so a replica
/// can be checked against the exact decisions it followed.
#[derive(Clone)]
pub struct RecordingHandler {
    journal: Arc<Mutex<Journal>>,
    store: MemorySnapshotStore,
    reject_snapshots: bool,
}

impl RecordingHandler {
    pub fn new(store: MemorySnapshotStore) -> Self {
        Self {
            journal: Arc::new(Mutex::new(Journal::default())),
            store,
            reject_snapshots: false,
        }
    }

    /// A handler that refuses every snapshot it is offered.
    pub fn rejecting(store: MemorySnapshotStore) -> Self {
        Self {
            reject_snapshots: true,
            ..Self::new(store)
        }
    }

    pub fn journal(&self) -> Arc<Mutex<Journal>> {
        Arc::clone(&self.journal)
    }

    fn lock(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }
}

impl ProcessingHandler for RecordingHandler {
    fn process(&mut self, item: &Item, role: Role) -> HandlerResult<Vec<SideEffect>> {
        let mut journal = self.lock();
        journal.processed.push((item.key.clone(), role));
        journal.state.insert(item.key.clone());
        Ok(vec![SideEffect::new("applied", json!(item.key))])
    }

    fn process_with_snapshot(&mut self, item: &Item, role: Role) -> HandlerResult<Vec<SideEffect>> {
        let side_effects = self.process(item, role)?;
        let state = {
            let mut journal = self.lock();
            journal.snapshots_taken += 1;
            serde_json::to_vec(&journal.state).map_err(|e| HandlerError::new(e.to_string()))?
        };
        self.store
            .serialize(&SnapshotInfo::new(item.offset + 1, state))
            .map_err(|e| HandlerError::new(e.to_string()))?;
        Ok(side_effects)
    }

    fn process_side_effects_on_replica(&mut self, side_effects: &[SideEffect]) -> HandlerResult<()> {
        let mut journal = self.lock();
        for side_effect in side_effects {
            let key = side_effect
                .payload
                .as_str()
                .ok_or_else(|| HandlerError::new("side effect without key"))?;
            journal.side_effects.push(key.to_string());
        }
        Ok(())
    }

    fn initialize_from_snapshot(
        &mut self,
        _config: &ReplicationConfig,
        snapshot: &SnapshotInfo,
    ) -> bool {
        if self.reject_snapshots {
            return false;
        }
        let state = if snapshot.state.is_empty() {
            BTreeSet::new()
        } else {
            match serde_json::from_slice(&snapshot.state) {
                Ok(state) => state,
                Err(_) => return false,
            }
        };
        let mut journal = self.lock();
        journal.state = state;
        journal.restored_from.push(snapshot.offset_during_snapshot);
        true
    }

    fn stop(&mut self) {
        self.lock().stopped = true;
    }
}

// =============================================================================
// Snapshot requesters
// =============================================================================

/// A leader that never answers.
pub struct FailingRequester;

impl SnapshotRequester for FailingRequester {
    fn ask_snapshot_on_demand(
        &self,
        _config: &ReplicationConfig,
        _store: &dyn SnapshotStore,
        _producer: &mut dyn Producer,
    ) -> SnapshotResult<SnapshotInfo> {
        Err(SnapshotError::unavailable("leader unreachable"))
    }
}

/// Serves the stored snapshot and counts the requests.
#[derive(Clone, Default)]
pub struct CountingRequester {
    pub calls: Arc<AtomicUsize>,
}

impl CountingRequester {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SnapshotRequester for CountingRequester {
    fn ask_snapshot_on_demand(
        &self,
        config: &ReplicationConfig,
        store: &dyn SnapshotStore,
        producer: &mut dyn Producer,
    ) -> SnapshotResult<SnapshotInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StoredSnapshotRequester.ask_snapshot_on_demand(config, store, producer)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Config with a short poll timeout; on-demand snapshots enabled.
pub fn config() -> ReplicationConfig {
    let mut config = ReplicationConfig::default();
    config.poll_timeout_ms = 20;
    config
}

/// Config with on-demand snapshots skipped.
pub fn config_without_snapshots() -> ReplicationConfig {
    let mut config = config();
    config.skip_on_demand_snapshot = true;
    config
}

/// A node whose handler persists into, and restores from, `store`.
pub struct Node {
    pub consumer: TestConsumer,
    pub journal: Arc<Mutex<Journal>>,
    pub store: MemorySnapshotStore,
}

impl Node {
    pub fn build(
        broker: &MemoryBroker,
        config: ReplicationConfig,
        store: MemorySnapshotStore,
        requester: Box<dyn SnapshotRequester>,
    ) -> Self {
        Self::with_handler(broker, config, RecordingHandler::new(store.clone()), store, requester)
    }

    pub fn with_handler(
        broker: &MemoryBroker,
        config: ReplicationConfig,
        handler: RecordingHandler,
        store: MemorySnapshotStore,
        requester: Box<dyn SnapshotRequester>,
    ) -> Self {
        let journal = handler.journal();
        let snapshots = SnapshotCoordinator::new(requester, Box::new(store.clone()));
        let consumer =
            ReplicationConsumer::new(config, broker.clone(), handler, broker.producer(), snapshots)
                .unwrap();
        Self {
            consumer,
            journal,
            store,
        }
    }

    /// A node that never asks for on-demand snapshots.
    pub fn without_snapshots(broker: &MemoryBroker) -> Self {
        Self::build(
            broker,
            config_without_snapshots(),
            MemorySnapshotStore::new(),
            Box::new(StoredSnapshotRequester),
        )
    }

    /// A node that bootstraps from `snapshot` when it becomes a replica.
    pub fn from_snapshot(broker: &MemoryBroker, snapshot: SnapshotInfo) -> Self {
        Self::build(
            broker,
            config(),
            MemorySnapshotStore::with_snapshot(snapshot),
            Box::new(StoredSnapshotRequester),
        )
    }

    pub fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }

    /// Run cycles until `done` holds, failing after `max_cycles`.
    pub fn drive_until(&mut self, max_cycles: usize, done: impl Fn(&Self) -> bool) {
        for _ in 0..max_cycles {
            if done(self) {
                return;
            }
            self.consumer.consume_once().unwrap();
        }
        assert!(done(self), "condition not reached in {} cycles", max_cycles);
    }

    /// Run cycles until the handler applied `count` items.
    pub fn drive_until_processed(&mut self, count: usize) {
        self.drive_until(200, |node| node.journal().processed.len() >= count);
    }
}

/// Snapshot state of an engine that applied `keys`.
pub fn snapshot_of(offset: i64, keys: &[&str]) -> SnapshotInfo {
    let state: BTreeSet<String> = keys.iter().map(|k| k.to_string()).collect();
    SnapshotInfo::new(offset, serde_json::to_vec(&state).unwrap())
}

pub fn publish_events(broker: &MemoryBroker, keys: &[&str]) {
    for key in keys {
        broker.publish("events", key, format!("payload-{}", key).into_bytes());
    }
}

/// Append a leader decision for the event at `event_offset`.
pub fn publish_control(broker: &MemoryBroker, key: &str, event_offset: i64) -> i64 {
    let message = ControlMessage::new(key, event_offset, Vec::new());
    broker.publish("control", key, message.encode().unwrap())
}

/// Decoded control stream.
pub fn control_log(broker: &MemoryBroker) -> Vec<ControlMessage> {
    broker
        .records("control", 0)
        .iter()
        .map(|r| ControlMessage::decode(&r.value).unwrap())
        .collect()
}

/// Leader that processed every event in `keys`.
pub fn lead(broker: &MemoryBroker, keys: &[&str]) -> Node {
    publish_events(broker, keys);
    let mut leader = Node::without_snapshots(broker);
    leader.consumer.update_status(Role::Leader).unwrap();
    leader.drive_until_processed(keys.len());
    leader
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Offsets of every commit issued by `group`, in order.
pub fn commit_offsets(broker: &MemoryBroker, group: &str) -> Vec<i64> {
    broker
        .commit_log(group)
        .into_iter()
        .map(|(_, offset)| offset)
        .collect()
}
