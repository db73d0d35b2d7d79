//! The bounded record buffer shared by storage and the publish targets.
//!
//! The buffer is a fixed-capacity ring with one read cursor per registered consumer. A record stays in the buffer
//! until every consumer has read past it; when the ring is full the oldest record is evicted regardless, and the
//! eviction is counted rather than reported as an error. Consumers only ever receive copies, so each one observes
//! every record it did not miss, in push order.
//!
//! ```text
//!            head                                 head + len
//!             │                                       │
//!             ▼                                       ▼
//!   evicted │ r7 │ r8 │ r9 │ r10 │ r11 │ r12 │ r13 │   (capacity 8)
//!                   ▲               ▲
//!                storage          serial
//! ```

use std::collections::VecDeque;

use crate::reading::Record;

/// Identifies a consumer registered with a [`RecordBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(usize);

#[derive(Debug)]
struct Cursor {
    name: &'static str,
    /// Absolute index of the next record this consumer reads.
    position: u64,
    /// Records evicted before this consumer read them.
    missed: u64,
}

/// A fixed-capacity ring of records with per-consumer cursors.
#[derive(Debug)]
pub struct RecordBuffer {
    slots: VecDeque<Record>,
    capacity: usize,
    /// Absolute index of `slots[0]`.
    head: u64,
    cursors: Vec<Cursor>,
    overflow: u64,
}

impl RecordBuffer {
    /// Creates an empty buffer holding at most `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; [`Config::validate`](crate::config::Config::validate) rejects that value.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "record buffer capacity must be non-zero");
        Self {
            slots: VecDeque::with_capacity(capacity),
            capacity,
            head: 0,
            cursors: Vec::new(),
            overflow: 0,
        }
    }

    /// Registers a consumer. Its cursor starts after the records already buffered.
    pub fn register(&mut self, name: &'static str) -> ConsumerId {
        self.cursors.push(Cursor {
            name,
            position: self.tail(),
            missed: 0,
        });
        ConsumerId(self.cursors.len() - 1)
    }

    /// Appends `record`. Never blocks and never fails.
    ///
    /// If the buffer is full, the oldest record is evicted first and the overflow counter is incremented; every
    /// consumer that had not read it yet skips it.
    pub fn push(&mut self, record: Record) {
        if self.slots.len() == self.capacity {
            self.evict_oldest();
        }
        self.slots.push_back(record);
        self.retire();
    }

    /// The oldest record `consumer` has not read yet, without advancing its cursor.
    pub fn peek_unconsumed(&self, consumer: ConsumerId) -> Option<&Record> {
        let position = self.cursor(consumer).position;
        let offset = usize::try_from(position - self.head).ok()?;
        self.slots.get(offset)
    }

    /// Marks the record returned by [`peek_unconsumed`](Self::peek_unconsumed) as read.
    pub fn advance(&mut self, consumer: ConsumerId) {
        let tail = self.tail();
        let cursor = self.cursor_mut(consumer);
        if cursor.position < tail {
            cursor.position += 1;
            self.retire();
        }
    }

    /// Returns a copy of the next unread record for `consumer` and advances its cursor.
    pub fn next_unconsumed(&mut self, consumer: ConsumerId) -> Option<Record> {
        let record = self.peek_unconsumed(consumer).cloned()?;
        self.advance(consumer);
        Some(record)
    }

    /// Moves the cursor of `consumer` past every buffered record and returns how many it skipped.
    pub fn skip_all(&mut self, consumer: ConsumerId) -> u64 {
        let tail = self.tail();
        let cursor = self.cursor_mut(consumer);
        let skipped = tail - cursor.position;
        cursor.position = tail;
        self.retire();
        skipped
    }

    /// Number of records `consumer` has not read yet.
    pub fn unconsumed(&self, consumer: ConsumerId) -> usize {
        let unread = self.tail() - self.cursor(consumer).position;
        usize::try_from(unread).unwrap_or(usize::MAX)
    }

    /// Number of records `consumer` lost to overflow eviction.
    pub fn missed(&self, consumer: ConsumerId) -> u64 {
        self.cursor(consumer).missed
    }

    /// Name `consumer` was registered with.
    pub fn consumer_name(&self, consumer: ConsumerId) -> &'static str {
        self.cursor(consumer).name
    }

    /// Number of records evicted because the buffer was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of records held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Absolute index one past the newest record.
    fn tail(&self) -> u64 {
        self.head + self.slots.len() as u64
    }

    fn evict_oldest(&mut self) {
        if self.slots.pop_front().is_none() {
            return;
        }
        self.head += 1;
        self.overflow += 1;

        let head = self.head;
        for cursor in &mut self.cursors {
            if cursor.position < head {
                cursor.position = head;
                cursor.missed += 1;
                tracing::trace!(consumer = cursor.name, "record evicted before it was read");
            }
        }

        if self.overflow.is_power_of_two() {
            tracing::warn!(overflow = self.overflow, "record buffer overflow");
        }
    }

    /// Drops records every consumer has read.
    fn retire(&mut self) {
        let slowest = self
            .cursors
            .iter()
            .map(|cursor| cursor.position)
            .min()
            .unwrap_or_else(|| self.tail());
        while self.head < slowest && self.slots.pop_front().is_some() {
            self.head += 1;
        }
    }

    fn cursor(&self, consumer: ConsumerId) -> &Cursor {
        &self.cursors[consumer.0]
    }

    fn cursor_mut(&mut self, consumer: ConsumerId) -> &mut Cursor {
        &mut self.cursors[consumer.0]
    }
}

#[cfg(test)]
mod tests {
    use datalogger_osal_api::time::Instant;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::Timestamp;
    use crate::reading::{MemsData, Payload, Reading};

    fn record(seq: u64) -> Record {
        Record {
            session: 1,
            seq,
            reading: Reading::new(
                Timestamp::monotonic(Instant::from_millis(seq * 10)),
                Payload::Mems(MemsData::default()),
            ),
        }
    }

    fn drain(buffer: &mut RecordBuffer, consumer: ConsumerId) -> Vec<u64> {
        std::iter::from_fn(|| buffer.next_unconsumed(consumer))
            .map(|record| record.seq)
            .collect()
    }

    #[test]
    fn each_consumer_sees_every_record_in_order() {
        let mut buffer = RecordBuffer::new(8);
        let storage = buffer.register("storage");
        let serial = buffer.register("serial");

        for seq in 0..5 {
            buffer.push(record(seq));
        }

        assert_eq!(drain(&mut buffer, storage), vec![0, 1, 2, 3, 4]);
        assert_eq!(buffer.len(), 5, "serial has not read anything yet");
        assert_eq!(drain(&mut buffer, serial), vec![0, 1, 2, 3, 4]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn slots_retire_once_slowest_consumer_passes() {
        let mut buffer = RecordBuffer::new(8);
        let fast = buffer.register("fast");
        let slow = buffer.register("slow");

        for seq in 0..4 {
            buffer.push(record(seq));
        }
        drain(&mut buffer, fast);
        buffer.advance(slow);
        buffer.advance(slow);

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.unconsumed(slow), 2);
        assert_eq!(buffer.unconsumed(fast), 0);
    }

    #[test]
    fn push_at_capacity_evicts_exactly_one() {
        let mut buffer = RecordBuffer::new(4);
        let consumer = buffer.register("storage");

        for seq in 0..4 {
            buffer.push(record(seq));
        }
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.overflow_count(), 0);

        buffer.push(record(4));

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.overflow_count(), 1);
        assert_eq!(buffer.missed(consumer), 1);
        assert_eq!(drain(&mut buffer, consumer), vec![1, 2, 3, 4]);
    }

    #[test]
    fn eviction_only_marks_consumers_that_had_not_read() {
        let mut buffer = RecordBuffer::new(2);
        let reader = buffer.register("reader");
        let lagging = buffer.register("lagging");

        buffer.push(record(0));
        buffer.push(record(1));
        drain(&mut buffer, reader);
        buffer.push(record(2));

        assert_eq!(buffer.missed(reader), 0);
        assert_eq!(buffer.missed(lagging), 1);
        assert_eq!(drain(&mut buffer, lagging), vec![1, 2]);
        assert_eq!(drain(&mut buffer, reader), vec![2]);
    }

    #[test]
    fn late_consumer_starts_at_tail() {
        let mut buffer = RecordBuffer::new(4);
        let early = buffer.register("early");
        buffer.push(record(0));
        let late = buffer.register("late");
        buffer.push(record(1));

        assert_eq!(drain(&mut buffer, late), vec![1]);
        assert_eq!(drain(&mut buffer, early), vec![0, 1]);
    }

    #[test]
    fn skip_all_releases_slots_for_that_consumer_only() {
        let mut buffer = RecordBuffer::new(8);
        let storage = buffer.register("storage");
        let serial = buffer.register("serial");
        for seq in 0..3 {
            buffer.push(record(seq));
        }

        assert_eq!(buffer.skip_all(storage), 3);
        assert_eq!(buffer.skip_all(storage), 0);
        assert_eq!(buffer.len(), 3, "serial still holds the records");
        assert_eq!(drain(&mut buffer, serial), vec![0, 1, 2]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn buffer_without_consumers_retains_nothing() {
        let mut buffer = RecordBuffer::new(4);
        for seq in 0..10 {
            buffer.push(record(seq));
        }
        assert!(buffer.is_empty());
        assert_eq!(buffer.overflow_count(), 0);
    }

    #[test]
    fn consumers_never_observe_a_sequence_twice() {
        let mut buffer = RecordBuffer::new(3);
        let a = buffer.register("a");
        let b = buffer.register("b");
        let mut seen_a = Vec::new();
        let mut seen_b = Vec::new();

        // Interleave pushes with uneven reads so both eviction and retirement happen.
        for seq in 0..40u64 {
            buffer.push(record(seq));
            if seq % 2 == 0 {
                seen_a.extend(buffer.next_unconsumed(a).map(|r| r.seq));
            }
            if seq % 5 == 0 {
                seen_b.extend(buffer.next_unconsumed(b).map(|r| r.seq));
            }
        }
        seen_a.extend(drain(&mut buffer, a));
        seen_b.extend(drain(&mut buffer, b));

        for seen in [&seen_a, &seen_b] {
            assert!(seen.windows(2).all(|pair| pair[0] < pair[1]), "{seen:?}");
        }
        assert_eq!(seen_a.last(), Some(&39));
        assert_eq!(seen_b.last(), Some(&39));
        assert_eq!(
            seen_b.len() as u64 + buffer.missed(b),
            40,
            "every record is either read or counted as missed"
        );
    }
}
