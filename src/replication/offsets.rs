//! Offset Tracker
//!
//! Single-owner bookkeeping of the consumer loop:
//! - the processing position (key and control offset of the latest
//!   decision this node applied or published)
//! - the last applied offset of each stream
//! - the consumed position (`offset + 1` of the last applied record) and
//!   the last committed offset of each topic-partition
//!
//! Applied offsets never move backwards while a role assignment lasts;
//! redelivered records leave them unchanged.

use std::collections::BTreeMap;

use crate::stream::{OffsetMap, TopicPartition};

/// Key and control-stream offset of the latest decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingPosition {
    pub key: String,
    pub offset: i64,
}

/// Where a control record sits relative to the processing position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOrder {
    /// No decision seen yet: the record becomes the baseline
    First,
    /// Exactly one past the processing position
    Next,
    /// At or below the processing position (redelivery)
    AlreadyApplied,
    /// Past the expected offset (truncated or compacted log)
    Gap { expected: i64 },
}

#[derive(Debug, Default)]
pub struct OffsetTracker {
    processing: Option<ProcessingPosition>,
    last_event: Option<i64>,
    last_control: Option<i64>,
    consumed: BTreeMap<TopicPartition, i64>,
    committed: BTreeMap<TopicPartition, i64>,
    control_baseline: Option<i64>,
    last_published: Option<i64>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processing(&self) -> Option<&ProcessingPosition> {
        self.processing.as_ref()
    }

    pub fn processing_key(&self) -> Option<&str> {
        self.processing.as_ref().map(|p| p.key.as_str())
    }

    pub fn set_processing(&mut self, key: impl Into<String>, offset: i64) {
        self.processing = Some(ProcessingPosition {
            key: key.into(),
            offset,
        });
    }

    /// Classify a control record against the processing position.
    pub fn classify_control(&self, offset: i64) -> ControlOrder {
        match &self.processing {
            None => ControlOrder::First,
            Some(p) if offset == p.offset + 1 => ControlOrder::Next,
            Some(p) if offset <= p.offset => ControlOrder::AlreadyApplied,
            Some(p) => ControlOrder::Gap {
                expected: p.offset + 1,
            },
        }
    }

    pub fn mark_event_processed(&mut self, offset: i64) {
        self.last_event = Some(self.last_event.map_or(offset, |o| o.max(offset)));
    }

    pub fn mark_control_processed(&mut self, offset: i64) {
        self.last_control = Some(self.last_control.map_or(offset, |o| o.max(offset)));
    }

    pub fn last_processed_event(&self) -> Option<i64> {
        self.last_event
    }

    pub fn last_processed_control(&self) -> Option<i64> {
        self.last_control
    }

    /// Where the events subscription resumes, if this node applied any.
    pub fn events_seek_offset(&self) -> Option<i64> {
        self.last_event.map(|o| o + 1)
    }

    /// Where the control subscription resumes, if this node has a position.
    pub fn control_seek_offset(&self) -> Option<i64> {
        let position = self.processing.as_ref().map(|p| p.offset);
        match (self.last_control, position) {
            (Some(a), Some(b)) => Some(a.max(b) + 1),
            (Some(a), None) | (None, Some(a)) => Some(a + 1),
            (None, None) => None,
        }
    }

    /// Record the position after an applied record, committed or not.
    pub fn record_consumed(&mut self, partition: &TopicPartition, next_offset: i64) {
        let position = self.consumed.entry(partition.clone()).or_insert(next_offset);
        *position = (*position).max(next_offset);
    }

    pub fn consumed(&self, partition: &TopicPartition) -> Option<i64> {
        self.consumed.get(partition).copied()
    }

    /// Record a successful commit.
    ///
    /// Returns `false` if the offset does not advance past the previous
    /// commit of the same topic-partition.
    pub fn record_commit(&mut self, partition: &TopicPartition, offset: i64) -> bool {
        let advanced = self
            .committed
            .get(partition)
            .map_or(true, |previous| offset > *previous);
        self.committed.insert(partition.clone(), offset);
        advanced
    }

    pub fn committed(&self, partition: &TopicPartition) -> Option<i64> {
        self.committed.get(partition).copied()
    }

    /// Consumed positions of the given topic, for the final commit on stop.
    pub fn consumed_for_topic(&self, topic: &str) -> OffsetMap {
        self.consumed
            .iter()
            .filter(|(tp, _)| tp.topic == topic)
            .map(|(tp, offset)| (tp.clone(), *offset))
            .collect()
    }

    /// Control tail observed when consumption (re)started.
    pub fn set_control_baseline(&mut self, end_offset: i64) {
        self.control_baseline = Some(end_offset);
    }

    pub fn record_published(&mut self, control_offset: i64) {
        self.last_published = Some(control_offset);
    }

    pub fn last_published_control(&self) -> Option<i64> {
        self.last_published
    }

    /// Control tail a leader expects when nobody else is publishing.
    pub fn expected_control_end(&self) -> Option<i64> {
        match (self.last_published, self.control_baseline) {
            (Some(published), Some(baseline)) => Some((published + 1).max(baseline)),
            (Some(published), None) => Some(published + 1),
            (None, baseline) => baseline,
        }
    }

    /// Forget everything (state replaced from a snapshot).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
