//! aeroha - Leader/replica event-sourced replication consumer
//!
//! A stateful engine gets a hot standby by replaying two single-partition
//! streams:
//! - the events stream: units of work, consumed by the leader
//! - the control stream: one decision per processed item, published by the
//!   leader and followed by every replica
//!
//! A replica applies only the side effects recorded by the leader and
//! replays the matching event when its key comes up, so leader and replica
//! stay aligned without distributed locks.

pub mod control;
pub mod handler;
pub mod observability;
pub mod replication;
pub mod snapshot;
pub mod stream;

pub use control::{ControlMessage, Item, SideEffect};
pub use handler::{HandlerError, HandlerResult, ProcessingHandler};
pub use replication::{
    ConsumerHandle, PolledTarget, ReplicationConfig, ReplicationConsumer, ReplicationError,
    ReplicationResult, Role, RunningConsumer, SnapshotCoordinator,
};
pub use snapshot::{
    FileSnapshotStore, MemorySnapshotStore, SnapshotInfo, SnapshotRequester, SnapshotStore,
    StoredSnapshotRequester,
};
pub use stream::{ClientFactory, Producer, Record, StreamClient, TopicPartition};
