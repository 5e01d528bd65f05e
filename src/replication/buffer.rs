//! In-flight record buffer
//!
//! Holds polled-but-unapplied records of one stream in arrival order. A
//! record leaves the buffer only once it has been applied, so a batch
//! interrupted by a target switch or an error resumes exactly where it
//! stopped.

use std::collections::VecDeque;

use crate::stream::Record;

/// FIFO of polled records for one stream
#[derive(Debug, Default)]
pub struct RecordBuffer {
    records: VecDeque<Record>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a polled batch behind any records still pending.
    pub fn fill(&mut self, batch: Vec<Record>) {
        self.records.extend(batch);
    }

    /// The next record to apply.
    pub fn peek(&self) -> Option<&Record> {
        self.records.front()
    }

    /// Up to `max` pending records, oldest first.
    pub fn peek_batch(&self, max: usize) -> impl Iterator<Item = &Record> {
        self.records.iter().take(max)
    }

    /// Remove the record returned by `peek` once it has been applied.
    pub fn consume_one(&mut self) -> Option<Record> {
        self.records.pop_front()
    }

    /// Number of pending records.
    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every pending record (subscriptions are being rebuilt).
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: i64) -> Record {
        Record {
            topic: "events".to_string(),
            partition: 0,
            offset,
            key: format!("k{}", offset),
            value: Vec::new(),
        }
    }

    #[test]
    fn test_consumes_in_arrival_order() {
        let mut buffer = RecordBuffer::new();
        buffer.fill(vec![record(0), record(1)]);
        buffer.fill(vec![record(2)]);

        assert_eq!(buffer.consume_one().unwrap().offset, 0);
        assert_eq!(buffer.consume_one().unwrap().offset, 1);
        assert_eq!(buffer.consume_one().unwrap().offset, 2);
        assert!(buffer.consume_one().is_none());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut buffer = RecordBuffer::new();
        buffer.fill(vec![record(4)]);

        assert_eq!(buffer.peek().unwrap().offset, 4);
        assert_eq!(buffer.remaining(), 1);
    }

    #[test]
    fn test_partial_drain_keeps_exact_tail() {
        let mut buffer = RecordBuffer::new();
        buffer.fill((0..5).map(record).collect());

        buffer.consume_one();
        buffer.consume_one();

        let tail: Vec<i64> = buffer.peek_batch(buffer.remaining()).map(|r| r.offset).collect();
        assert_eq!(tail, vec![2, 3, 4]);
        let head: Vec<i64> = buffer.peek_batch(2).map(|r| r.offset).collect();
        assert_eq!(head, vec![2, 3]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = RecordBuffer::new();
        buffer.fill(vec![record(0), record(1)]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.remaining(), 0);
    }
}
