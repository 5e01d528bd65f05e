//! Loop Thread and Shutdown Tests
//!
//! - Role requests reach the loop thread through its handle
//! - Stop interrupts a blocking poll, commits, closes, stops the handler
//! - Transient poll failures never stop the loop

mod common;

use std::time::{Duration, Instant};

use aeroha::stream::memory::MemoryBroker;
use aeroha::stream::TopicPartition;
use aeroha::{MemorySnapshotStore, ReplicationError, Role, StoredSnapshotRequester};
use common::{
    commit_offsets, config_without_snapshots, control_log, publish_events, wait_for, Node,
};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Loop Thread
// =============================================================================

/// A spawned leader processes events and shuts down cleanly.
#[test]
fn test_spawned_leader_processes_and_shuts_down() {
    let broker = MemoryBroker::new();
    let node = Node::without_snapshots(&broker);
    let config = node.consumer.config().clone();
    let journal = node.journal.clone();
    let running = node.consumer.spawn().unwrap();

    running.handle().update_status(Role::Leader).unwrap();
    publish_events(&broker, &["k0", "k1", "k2"]);
    assert!(wait_for(WAIT, || broker.records("control", 0).len() == 3));

    running.shutdown().unwrap();

    assert_eq!(
        broker.committed(&config.events_group(), &TopicPartition::new("events", 0)),
        Some(3)
    );
    assert!(journal.lock().unwrap().stopped);
    let ids: Vec<String> = control_log(&broker).into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["k0", "k1", "k2"]);
}

/// Stop interrupts a poll that would otherwise block for a minute.
#[test]
fn test_stop_interrupts_blocking_poll() {
    let broker = MemoryBroker::new();
    let mut config = config_without_snapshots();
    config.poll_timeout_ms = 60_000;
    let node = Node::build(
        &broker,
        config,
        MemorySnapshotStore::new(),
        Box::new(StoredSnapshotRequester),
    );
    let running = node.consumer.spawn().unwrap();
    running.handle().update_status(Role::Leader).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    running.shutdown().unwrap();
    assert!(started.elapsed() < WAIT);
}

/// Stop also ends a loop that never started consuming.
#[test]
fn test_stop_idle_loop() {
    let broker = MemoryBroker::new();
    let mut config = config_without_snapshots();
    config.poll_timeout_ms = 60_000;
    let node = Node::build(
        &broker,
        config,
        MemorySnapshotStore::new(),
        Box::new(StoredSnapshotRequester),
    );
    let running = node.consumer.spawn().unwrap();

    let started = Instant::now();
    running.shutdown().unwrap();
    assert!(started.elapsed() < WAIT);
}

/// A fatal start failure ends the loop with that error.
#[test]
fn test_fatal_command_ends_loop() {
    let broker = MemoryBroker::new();
    broker.create_topic("events", 2);
    let node = Node::without_snapshots(&broker);
    let running = node.consumer.spawn().unwrap();
    let handle = running.handle().clone();

    handle.update_status(Role::Leader).unwrap();
    let err = running.join().unwrap_err();

    assert!(matches!(err, ReplicationError::MultiplePartitions { .. }));
    assert!(matches!(
        handle.update_status(Role::Replica),
        Err(ReplicationError::LoopTerminated)
    ));
}

/// A failed forced restart is logged and the loop keeps serving.
#[test]
fn test_failed_restart_command_keeps_loop_alive() {
    let broker = MemoryBroker::new();
    let node = Node::without_snapshots(&broker);
    let running = node.consumer.spawn().unwrap();
    let handle = running.handle().clone();

    handle.update_status(Role::Leader).unwrap();
    handle.restart_consumer().unwrap();
    publish_events(&broker, &["k0"]);

    assert!(wait_for(WAIT, || broker.records("control", 0).len() == 1));
    running.shutdown().unwrap();
}

// =============================================================================
// Stop
// =============================================================================

/// Stop commits what was applied, closes, stops the handler; twice is fine.
#[test]
fn test_stop_final_commit_and_idempotence() {
    let broker = MemoryBroker::new();
    publish_events(&broker, &["k0", "k1", "k2"]);
    let mut node = Node::without_snapshots(&broker);
    node.consumer.update_status(Role::Leader).unwrap();
    node.drive_until_processed(3);

    node.consumer.stop().unwrap();
    node.consumer.stop().unwrap();

    let config = node.consumer.config().clone();
    assert_eq!(commit_offsets(&broker, &config.events_group()), vec![1, 2, 3, 3]);
    assert!(commit_offsets(&broker, &config.control_group()).is_empty());
    assert!(node.journal().stopped);
    assert!(!node.consumer.is_started());
    assert!(matches!(
        node.consumer.update_status(Role::Replica),
        Err(ReplicationError::LoopTerminated)
    ));
}

/// A commit that failed in the loop is made good by the final commit.
#[test]
fn test_stop_commits_past_failed_commit() {
    let broker = MemoryBroker::new();
    let mut node = Node::without_snapshots(&broker);
    node.consumer.update_status(Role::Leader).unwrap();
    publish_events(&broker, &["k0"]);
    node.drive_until_processed(1);

    broker.inject_commit_failures(1);
    publish_events(&broker, &["k1"]);
    node.drive_until_processed(2);

    let group = node.consumer.config().events_group();
    let tp = TopicPartition::new("events", 0);
    assert_eq!(node.consumer.offsets().last_processed_event(), Some(1));
    assert_eq!(broker.committed(&group, &tp), Some(1));

    node.consumer.stop().unwrap();
    assert_eq!(broker.committed(&group, &tp), Some(2));
}

/// Stopping a consumer that never started only stops the handler.
#[test]
fn test_stop_before_start() {
    let broker = MemoryBroker::new();
    let mut node = Node::without_snapshots(&broker);

    node.consumer.stop().unwrap();

    assert!(node.journal().stopped);
    assert!(commit_offsets(&broker, &node.consumer.config().events_group()).is_empty());
}

// =============================================================================
// Transient Failures
// =============================================================================

/// Failed polls are counted and retried on the next cycle.
#[test]
fn test_transient_poll_failures_are_retried() {
    let broker = MemoryBroker::new();
    let mut node = Node::without_snapshots(&broker);
    node.consumer.update_status(Role::Leader).unwrap();
    publish_events(&broker, &["k0"]);
    broker.inject_poll_failures(2);

    node.consumer.consume_once().unwrap();
    node.consumer.consume_once().unwrap();
    assert!(node.journal().processed.is_empty());
    assert_eq!(node.consumer.metrics().snapshot().poll_failures, 2);

    node.consumer.consume_once().unwrap();
    assert_eq!(node.journal().processed_keys(), vec!["k0"]);
}

/// A loop thread survives transient poll failures.
#[test]
fn test_spawned_loop_survives_poll_failures() {
    let broker = MemoryBroker::new();
    let node = Node::without_snapshots(&broker);
    let running = node.consumer.spawn().unwrap();
    running.handle().update_status(Role::Leader).unwrap();

    broker.inject_poll_failures(3);
    publish_events(&broker, &["k0", "k1"]);

    assert!(wait_for(WAIT, || broker.records("control", 0).len() == 2));
    running.shutdown().unwrap();
}
