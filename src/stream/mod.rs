//! Stream Client Boundary
//!
//! The replication consumer reaches the broker only through the traits in
//! this module:
//! - `StreamClient`: assign/seek/poll/commit on one subscription
//! - `ClientFactory`: builds fresh clients when subscriptions are rebuilt
//! - `Producer`: appends records (leader only)
//! - `Wakeup`: interrupts a blocking poll from another thread
//!
//! Every logical stream is a single-partition topic. Offsets are
//! stream-local and start at zero.

mod errors;
pub mod memory;

pub use errors::{StreamError, StreamResult};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A (topic, partition) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    /// Topic name
    pub topic: String,
    /// Partition number
    pub partition: u32,
}

impl TopicPartition {
    /// Create a new topic-partition.
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A record delivered by `StreamClient::poll`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub key: String,
    pub value: Vec<u8>,
}

impl Record {
    /// The topic-partition this record was read from.
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    /// The offset to commit once this record has been applied.
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}

/// Offsets to commit, keyed by topic-partition
pub type OffsetMap = BTreeMap<TopicPartition, i64>;

/// Interrupts a blocking `poll` from another thread.
///
/// A wakeup issued while no poll is in progress interrupts the next poll.
pub trait Wakeup: Send + Sync {
    fn wakeup(&self);
}

/// One subscription against the broker.
///
/// Clients are owned by the consumer loop thread. The only cross-thread
/// entry point is the `Wakeup` handle returned by `waker`.
pub trait StreamClient: Send {
    /// List the partitions of a topic.
    fn partitions_for(&mut self, topic: &str) -> StreamResult<Vec<TopicPartition>>;

    /// Replace the current assignment.
    ///
    /// The position of each newly assigned partition starts at the
    /// committed offset of this client's group, or zero.
    fn assign(&mut self, partitions: &[TopicPartition]) -> StreamResult<()>;

    /// The partitions currently assigned.
    fn assignment(&self) -> Vec<TopicPartition>;

    /// Move the read position of an assigned partition.
    fn seek(&mut self, partition: &TopicPartition, offset: i64) -> StreamResult<()>;

    /// The next offset `poll` will return for an assigned partition.
    fn position(&self, partition: &TopicPartition) -> StreamResult<i64>;

    /// The offset the next appended record will receive.
    ///
    /// Does not require the partition to be assigned.
    fn end_offset(&mut self, partition: &TopicPartition) -> StreamResult<i64>;

    /// Wait up to `timeout` for records on the assigned partitions.
    ///
    /// Returns `StreamError::Wakeup` when interrupted.
    fn poll(&mut self, timeout: Duration) -> StreamResult<Vec<Record>>;

    /// Synchronously commit the given offsets for this client's group.
    fn commit_sync(&mut self, offsets: &OffsetMap) -> StreamResult<()>;

    /// Handle that interrupts a blocking `poll` on this client.
    fn waker(&self) -> Arc<dyn Wakeup>;

    /// Release the client. Further calls fail with `StreamError::Closed`.
    fn close(&mut self);
}

/// Builds stream clients for a consumer group.
///
/// Called at startup and every time subscriptions are rebuilt.
pub trait ClientFactory: Send {
    type Client: StreamClient;

    fn create(&self, group: &str) -> StreamResult<Self::Client>;
}

/// Appends records to a stream.
pub trait Producer: Send {
    /// Publish a record and return the offset it was assigned.
    fn send(&mut self, topic: &str, key: &str, value: Vec<u8>) -> StreamResult<i64>;
}

/// Default bound for a single poll when the caller does not supply one
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1000);
