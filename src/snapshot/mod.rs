//! Snapshot subsystem
//!
//! A snapshot is a serialized engine state plus the events-stream offset it
//! corresponds to. Snapshots bound replay distance:
//! - a replica bootstraps from an on-demand snapshot before serving
//! - a forced consumer restart reloads the latest persisted snapshot
//! - a leader may persist one every N processed items
//!
//! # Persisted Layout (`FileSnapshotStore`)
//!
//! - state.bin (engine payload, byte-for-byte)
//! - manifest.json (offset, checksum and metadata)
//!
//! The manifest is written last, so a snapshot without a manifest does not
//! exist.

mod checksum;
mod errors;
mod manifest;
mod store;

pub use checksum::{compute_checksum, format_checksum, parse_checksum};
pub use errors::{Severity, SnapshotError, SnapshotErrorCode, SnapshotResult};
pub use manifest::{SnapshotManifest, MANIFEST_FORMAT_VERSION};
pub use store::FileSnapshotStore;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::replication::ReplicationConfig;
use crate::stream::Producer;

/// Snapshot ID type (basic timestamp plus a short random suffix)
pub type SnapshotId = String;

/// Generates a snapshot id such as `20261019T113000Z-3f2a9c1b`.
///
/// The suffix keeps ids unique when several snapshots are taken within
/// the same second.
pub fn generate_snapshot_id(at: DateTime<Utc>) -> SnapshotId {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", at.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// A point-in-time engine state aligned with an events-stream offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Snapshot identifier
    pub snapshot_id: SnapshotId,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// Events-stream offset the state corresponds to
    pub offset_during_snapshot: i64,
    /// Serialized engine state
    pub state: Vec<u8>,
}

impl SnapshotInfo {
    /// Create a snapshot taken now.
    pub fn new(offset_during_snapshot: i64, state: Vec<u8>) -> Self {
        let created_at = Utc::now();
        Self {
            snapshot_id: generate_snapshot_id(created_at),
            created_at,
            offset_during_snapshot,
            state,
        }
    }
}

/// Persists and reloads snapshots.
pub trait SnapshotStore: Send {
    /// Persist a snapshot, replacing the previous one.
    fn serialize(&mut self, snapshot: &SnapshotInfo) -> SnapshotResult<()>;

    /// Load the most recent snapshot, if any.
    fn deserialize(&self) -> SnapshotResult<Option<SnapshotInfo>>;
}

/// Obtains a fresh snapshot from the current leader.
pub trait SnapshotRequester: Send {
    /// Ask the leader for a snapshot and block until it is available.
    fn ask_snapshot_on_demand(
        &self,
        config: &ReplicationConfig,
        store: &dyn SnapshotStore,
        producer: &mut dyn Producer,
    ) -> SnapshotResult<SnapshotInfo>;
}

/// A `SnapshotStore` held in memory.
///
/// Clones share the same slot, so a test or an embedding process can
/// inspect what the consumer persisted.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    latest: Arc<Mutex<Option<SnapshotInfo>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a snapshot.
    pub fn with_snapshot(snapshot: SnapshotInfo) -> Self {
        Self {
            latest: Arc::new(Mutex::new(Some(snapshot))),
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn serialize(&mut self, snapshot: &SnapshotInfo) -> SnapshotResult<()> {
        let mut latest = self
            .latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *latest = Some(snapshot.clone());
        Ok(())
    }

    fn deserialize(&self) -> SnapshotResult<Option<SnapshotInfo>> {
        let latest = self
            .latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(latest.clone())
    }
}

/// Serves on-demand requests from a store shared with the leader.
///
/// Fits deployments where the leader persists snapshots periodically into
/// storage every node can read: the latest persisted snapshot is the
/// answer, and an empty store is an unavailable snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredSnapshotRequester;

impl SnapshotRequester for StoredSnapshotRequester {
    fn ask_snapshot_on_demand(
        &self,
        config: &ReplicationConfig,
        store: &dyn SnapshotStore,
        _producer: &mut dyn Producer,
    ) -> SnapshotResult<SnapshotInfo> {
        store.deserialize()?.ok_or_else(|| {
            SnapshotError::unavailable("no persisted snapshot to bootstrap from")
                .with_details(format!("events topic: {}", config.events_topic))
        })
    }
}
