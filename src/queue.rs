//! Bounded SPSC record queue between the framer and the sender.
//!
//! # Architecture
//!
//! ```text
//! Framer ──publish()──▶ [ byte ring | record lengths ] ──take_next()──▶ Sender
//!          blocks when full                            blocks when empty
//! ```
//!
//! # Rules
//!
//! - Exactly one producer and one consumer.
//! - Records carry an explicit length; there is no terminator byte.
//! - A record becomes visible only once all its bytes are in the ring.
//! - A full queue is backpressure: `publish` waits on a condition variable,
//!   it never drops and never spins.
//! - `write_offset - read_offset <= capacity` at all times.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{BridgeError, Result};
use crate::record::EncodedRecord;

/// Ring storage and cursors. Only ever touched under the queue lock.
struct Ring {
    buf: Box<[u8]>,
    /// Total bytes ever published (physical position = offset % capacity).
    write_offset: u64,
    /// Total bytes ever retired.
    read_offset: u64,
    /// Lengths of published, not yet taken records, oldest first.
    lengths: VecDeque<usize>,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn used(&self) -> usize {
        (self.write_offset - self.read_offset) as usize
    }

    fn free(&self) -> usize {
        self.capacity() - self.used()
    }

    fn position(&self, offset: u64) -> usize {
        (offset % self.capacity() as u64) as usize
    }

    fn write(&mut self, bytes: &[u8]) {
        let start = self.position(self.write_offset);
        let first = bytes.len().min(self.capacity() - start);
        self.buf[start..start + first].copy_from_slice(&bytes[..first]);
        self.buf[..bytes.len() - first].copy_from_slice(&bytes[first..]);

        // Publish: cursor and length move together, under the same lock.
        self.write_offset += bytes.len() as u64;
        self.lengths.push_back(bytes.len());
    }

    fn take(&mut self) -> Option<Vec<u8>> {
        let len = self.lengths.pop_front()?;
        let start = self.position(self.read_offset);
        let first = len.min(self.capacity() - start);

        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&self.buf[start..start + first]);
        out.extend_from_slice(&self.buf[..len - first]);

        self.read_offset += len as u64;
        Some(out)
    }
}

/// Bounded FIFO of encoded records.
pub struct RecordQueue {
    ring: Mutex<Ring>,
    /// Signalled when the consumer frees space.
    space_available: Condvar,
    /// Signalled when the producer publishes a record.
    data_available: Condvar,
}

impl RecordQueue {
    /// Create an empty queue holding up to `capacity` bytes of records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be non-zero");

        Self {
            ring: Mutex::new(Ring {
                buf: vec![0u8; capacity].into_boxed_slice(),
                write_offset: 0,
                read_offset: 0,
                lengths: VecDeque::new(),
            }),
            space_available: Condvar::new(),
            data_available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record, waiting for the consumer if there is not enough room.
    ///
    /// Fails only if the record is larger than the whole queue.
    pub fn publish(&self, record: &EncodedRecord) -> Result<()> {
        let len = record.len();
        let capacity = self.capacity();
        if len > capacity {
            return Err(BridgeError::RecordTooLarge { len, capacity });
        }

        let ring = self.lock();
        let mut ring = self
            .space_available
            .wait_while(ring, |r| r.free() < len)
            .unwrap_or_else(PoisonError::into_inner);
        ring.write(record.as_bytes());
        drop(ring);

        self.data_available.notify_one();
        Ok(())
    }

    /// Remove the oldest record, waiting until one is published.
    pub fn take_next(&self) -> EncodedRecord {
        let ring = self.lock();
        let mut ring = self
            .data_available
            .wait_while(ring, |r| r.lengths.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        self.retire(&mut ring)
    }

    /// Like [`RecordQueue::take_next`] but gives up after `timeout`.
    #[cfg(test)]
    fn take_next_timeout(&self, timeout: std::time::Duration) -> Option<EncodedRecord> {
        let ring = self.lock();
        let (mut ring, result) = self
            .data_available
            .wait_timeout_while(ring, timeout, |r| r.lengths.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && ring.lengths.is_empty() {
            return None;
        }
        Some(self.retire(&mut ring))
    }

    /// Remove the oldest record if one is ready.
    pub fn try_take_next(&self) -> Option<EncodedRecord> {
        let mut ring = self.lock();
        if ring.lengths.is_empty() {
            return None;
        }
        Some(self.retire(&mut ring))
    }

    fn retire(&self, ring: &mut Ring) -> EncodedRecord {
        // Callers only get here with at least one record queued
        let bytes = ring.take().unwrap_or_default();
        self.space_available.notify_one();
        EncodedRecord::from_bytes(bytes)
    }

    /// True while at least one fully published record is waiting.
    pub fn data_available(&self) -> bool {
        !self.lock().lengths.is_empty()
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.lock().lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by queued records.
    pub fn used_bytes(&self) -> usize {
        self.lock().used()
    }

    pub fn free_bytes(&self) -> usize {
        self.lock().free()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Total bytes ever published.
    pub fn write_offset(&self) -> u64 {
        self.lock().write_offset
    }

    /// Total bytes ever taken.
    pub fn read_offset(&self) -> u64 {
        self.lock().read_offset
    }
}
