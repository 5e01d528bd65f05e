//! Replication Subsystem
//!
//! Keeps a stateful engine replicated across nodes by consuming two
//! single-partition streams:
//! - Leader: applies events, publishes one control message per item
//! - Replica: applies the leader's side effects, then replays the event
//!   the decision points at
//!
//! Roles are assigned externally. This module never elects a leader; it
//! only switches behaviour when told to, and fails fast on a topology it
//! cannot replicate safely (multi-partition streams, missing baseline).

mod assignment;
mod buffer;
mod config;
mod consumer;
mod errors;
mod handle;
mod offsets;
mod role;
mod snapshot;

pub use assignment::{assign_stream, seek_or_committed, single_partition};
pub use buffer::RecordBuffer;
pub use config::ReplicationConfig;
pub use consumer::ReplicationConsumer;
pub use errors::{ReplicationError, ReplicationResult};
pub use handle::{Command, ConsumerHandle, RunningConsumer};
pub use offsets::{ControlOrder, OffsetTracker, ProcessingPosition};
pub use role::{PolledTarget, Role, RoleState, RoleTransition};
pub use snapshot::SnapshotCoordinator;
