//! Snapshot Coordinator
//!
//! Owns the snapshot collaborators of one consumer and decides when they
//! are used:
//! - on-demand snapshot before a replica first serves (once per node)
//! - latest persisted snapshot on a forced consumer restart
//! - periodic leader snapshots when on-demand snapshots are skipped
//!
//! A restored snapshot leaves a pending seek: the next assignment moves
//! every subscription to the snapshot offset instead of tracked offsets.

use super::config::ReplicationConfig;
use super::errors::{ReplicationError, ReplicationResult};
use crate::handler::ProcessingHandler;
use crate::observability::{log_event, Event, ObservationScope};
use crate::snapshot::{SnapshotError, SnapshotInfo, SnapshotRequester, SnapshotStore};
use crate::stream::Producer;

pub struct SnapshotCoordinator {
    requester: Box<dyn SnapshotRequester>,
    store: Box<dyn SnapshotStore>,
    asked_on_demand: bool,
    pending_seek: Option<i64>,
    processed_since_snapshot: u64,
}

impl SnapshotCoordinator {
    pub fn new(requester: Box<dyn SnapshotRequester>, store: Box<dyn SnapshotStore>) -> Self {
        Self {
            requester,
            store,
            asked_on_demand: false,
            pending_seek: None,
            processed_since_snapshot: 0,
        }
    }

    /// Obtain a baseline before a replica first serves.
    ///
    /// No-op when on-demand snapshots are skipped or one was already
    /// applied. Any failure is `SnapshotUnavailable`: a replica must not
    /// serve without a consistent baseline.
    pub fn bootstrap<H: ProcessingHandler + ?Sized>(
        &mut self,
        config: &ReplicationConfig,
        producer: &mut dyn Producer,
        handler: &mut H,
    ) -> ReplicationResult<()> {
        if config.skip_on_demand_snapshot || self.asked_on_demand {
            return Ok(());
        }

        let scope = ObservationScope::with_fields(
            "SNAPSHOT_ON_DEMAND",
            &[("events_topic", config.events_topic.as_str())],
        );
        let snapshot = match self
            .requester
            .ask_snapshot_on_demand(config, self.store.as_ref(), producer)
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let reason = e.to_string();
                scope.fail_fatal(&reason);
                return Err(ReplicationError::snapshot_unavailable(reason));
            }
        };

        if !handler.initialize_from_snapshot(config, &snapshot) {
            let reason = format!(
                "handler rejected on-demand snapshot {}",
                snapshot.snapshot_id
            );
            scope.fail_fatal(&reason);
            return Err(ReplicationError::snapshot_unavailable(reason));
        }

        self.asked_on_demand = true;
        self.pending_seek = Some(snapshot.offset_during_snapshot);
        let offset = snapshot.offset_during_snapshot.to_string();
        scope.complete_with_fields(&[
            ("snapshot_id", snapshot.snapshot_id.as_str()),
            ("offset", offset.as_str()),
        ]);
        Ok(())
    }

    /// Restore the latest persisted snapshot into the engine.
    ///
    /// An empty store leaves the engine untouched and is not fatal: the
    /// consumer keeps its tracked offsets. A snapshot the engine rejects
    /// leaves its state unknown and is fatal.
    pub fn restore_latest<H: ProcessingHandler + ?Sized>(
        &mut self,
        config: &ReplicationConfig,
        handler: &mut H,
    ) -> ReplicationResult<SnapshotInfo> {
        let snapshot = self
            .store
            .deserialize()?
            .ok_or_else(|| SnapshotError::unavailable("no persisted snapshot to restart from"))?;

        if !handler.initialize_from_snapshot(config, &snapshot) {
            return Err(ReplicationError::snapshot_unavailable(format!(
                "handler rejected snapshot {}",
                snapshot.snapshot_id
            )));
        }

        self.pending_seek = Some(snapshot.offset_during_snapshot);
        let offset = snapshot.offset_during_snapshot.to_string();
        log_event(
            Event::SnapshotRestored,
            &[
                ("snapshot_id", snapshot.snapshot_id.as_str()),
                ("offset", offset.as_str()),
            ],
        );
        Ok(snapshot)
    }

    /// Seek offset left by a restored snapshot, if not yet used.
    pub fn pending_seek(&self) -> Option<i64> {
        self.pending_seek
    }

    /// Take the pending seek; the next assignment uses tracked offsets.
    pub fn take_pending_seek(&mut self) -> Option<i64> {
        self.pending_seek.take()
    }

    pub fn asked_on_demand(&self) -> bool {
        self.asked_on_demand
    }

    /// Count a leader item; true when this item must be snapshotted.
    pub fn periodic_due(&mut self, config: &ReplicationConfig) -> bool {
        if !config.skip_on_demand_snapshot {
            return false;
        }
        self.processed_since_snapshot += 1;
        if self.processed_since_snapshot >= config.iterations_between_snapshot {
            self.processed_since_snapshot = 0;
            true
        } else {
            false
        }
    }
}
