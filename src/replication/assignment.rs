//! Partition assignment
//!
//! Every logical stream must resolve to exactly one partition: the
//! single-writer ordering of the protocol is per partition. Anything else
//! fails fast before a record is consumed.

use super::errors::{ReplicationError, ReplicationResult};
use crate::observability::{log_event, Event};
use crate::stream::{StreamClient, TopicPartition};

/// Resolve the single partition of `topic` without assigning it.
pub fn single_partition<C: StreamClient>(
    client: &mut C,
    topic: &str,
) -> ReplicationResult<TopicPartition> {
    let mut partitions = client.partitions_for(topic)?;
    match partitions.len() {
        0 => Err(ReplicationError::configuration(format!(
            "topic '{}' has no partitions",
            topic
        ))),
        1 => Ok(partitions.remove(0)),
        count => {
            let count_str = count.to_string();
            log_event(
                Event::PartitionViolation,
                &[("topic", topic), ("partitions", &count_str)],
            );
            Err(ReplicationError::MultiplePartitions {
                topic: topic.to_string(),
                count,
            })
        }
    }
}

/// Assign the single partition of `topic` to `client`.
pub fn assign_stream<C: StreamClient>(
    client: &mut C,
    topic: &str,
) -> ReplicationResult<TopicPartition> {
    let partition = single_partition(client, topic)?;
    client.assign(std::slice::from_ref(&partition))?;
    Ok(partition)
}

/// Seek an assigned partition, or keep the committed position when no
/// offset is known.
///
/// Returns the position the next poll starts from.
pub fn seek_or_committed<C: StreamClient>(
    client: &mut C,
    partition: &TopicPartition,
    offset: Option<i64>,
) -> ReplicationResult<i64> {
    if let Some(offset) = offset {
        client.seek(partition, offset)?;
    }
    Ok(client.position(partition)?)
}
