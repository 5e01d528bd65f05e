//! Replication Error Types
//!
//! Fatal errors abort startup or stop the loop: the node must not serve in
//! an inconsistent topology. Transient stream failures are logged by the
//! loop and retried on the next cycle.

use thiserror::Error;

use crate::handler::HandlerError;
use crate::snapshot::SnapshotError;
use crate::stream::StreamError;

/// Result type for replication operations
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Replication error type
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// A logical stream resolved to more than one partition
    #[error("topic '{topic}' has {count} partitions, exactly one is required")]
    MultiplePartitions { topic: String, count: usize },

    /// No snapshot baseline could be obtained when one is required
    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    /// Invalid configuration or topology
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation needs stream subscriptions that are not built
    #[error("consumer is not started")]
    NotStarted,

    /// The consumer loop is gone (handle used after the loop exited)
    #[error("consumer loop terminated")]
    LoopTerminated,

    /// The consumer thread could not be spawned
    #[error("failed to spawn consumer thread: {0}")]
    Spawn(std::io::Error),

    /// The processing handler failed to apply a record
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// A control record could not be decoded or encoded
    #[error("control record at offset {offset} is malformed: {message}")]
    Codec { offset: i64, message: String },

    /// The leader could not publish a control message
    #[error("failed to publish control message: {0}")]
    Publish(StreamError),

    /// Stream client failure
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Snapshot store failure
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl ReplicationError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a snapshot unavailable error.
    pub fn snapshot_unavailable(message: impl Into<String>) -> Self {
        Self::SnapshotUnavailable(message.into())
    }

    /// Check if this error is the benign wakeup interruption.
    pub fn is_wakeup(&self) -> bool {
        matches!(self, Self::Stream(e) if e.is_wakeup())
    }

    /// Check if this error must stop the consumer.
    ///
    /// A leader that cannot publish would commit events no replica can
    /// follow, so publish failures are fatal even when the cause is I/O.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MultiplePartitions { .. }
            | Self::SnapshotUnavailable(_)
            | Self::Configuration(_)
            | Self::NotStarted
            | Self::LoopTerminated
            | Self::Spawn(_)
            | Self::Handler(_)
            | Self::Codec { .. }
            | Self::Publish(_) => true,
            Self::Stream(e) => e.is_fatal(),
            Self::Snapshot(e) => e.is_fatal(),
        }
    }
}
