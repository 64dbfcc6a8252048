use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;

use super::{CapacityExhausted, RingChannel};

/// Counters of a [`MemoryRing`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    pub submitted: u64,
    pub discarded: u64,
    pub exhausted: u64,
}

/// In memory implementation of a ring channel. Neither reservation nor
/// publication ever waits: capacity is accounted with atomics and
/// published records go through a bounded lock free queue. A reserved
/// slot holds capacity until it is discarded, or until the published
/// record has been consumed.
pub struct MemoryRing<T> {
    capacity: usize,
    used: AtomicUsize,
    forced_failures: AtomicUsize,
    submitted: AtomicU64,
    discarded: AtomicU64,
    exhausted: AtomicU64,
    published: ArrayQueue<Box<T>>,
}

/// A record reserved in a [`MemoryRing`], it must be either submitted
/// or discarded to give capacity back.
pub struct MemorySlot<'a, T> {
    ring: &'a MemoryRing<T>,
    record: Box<T>,
}

impl<T> Deref for MemorySlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl<T> DerefMut for MemorySlot<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.record
    }
}

impl<T> MemoryRing<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
            forced_failures: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            // an ArrayQueue cannot be empty sized
            published: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Creates a ring holding as many records as fit in `size` bytes
    pub fn with_byte_size(size: usize) -> Self {
        Self::with_capacity(size / core::mem::size_of::<T>().max(1))
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently accounted (reserved or published)
    #[inline]
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Number of published records waiting to be consumed
    #[inline]
    pub fn len(&self) -> usize {
        self.published.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.published.is_empty()
    }

    /// Makes the next `n` reservations fail whatever the capacity left
    pub fn fail_next(&self, n: usize) {
        self.forced_failures.store(n, Ordering::Release);
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }

    /// Consumes the oldest published record
    pub fn pop(&self) -> Option<T> {
        let r = self.published.pop()?;
        self.release();
        Some(*r)
    }

    /// Consumes every record published so far
    pub fn drain(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(r) = self.pop() {
            out.push(r);
        }
        out
    }

    #[inline]
    fn take_forced_failure(&self) -> bool {
        self.forced_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    #[inline]
    fn account(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |u| {
                (u < self.capacity).then_some(u + 1)
            })
            .is_ok()
    }

    #[inline]
    fn release(&self) {
        self.used.fetch_sub(1, Ordering::AcqRel);
    }

    fn publish(&self, record: Box<T>) {
        match self.published.push(record) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
            }
            // accounting keeps the queue from ever being full
            Err(_) => self.drop_reserved(),
        }
    }

    fn drop_reserved(&self) {
        self.release();
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: Default> RingChannel<T> for MemoryRing<T> {
    type Slot<'a> = MemorySlot<'a, T> where Self: 'a;

    fn reserve(&self) -> Result<Self::Slot<'_>, CapacityExhausted> {
        if self.take_forced_failure() || !self.account() {
            self.exhausted.fetch_add(1, Ordering::Relaxed);
            return Err(CapacityExhausted);
        }

        Ok(MemorySlot {
            ring: self,
            record: Box::default(),
        })
    }

    // a slot always goes back to the ring it was reserved from, which
    // holds the capacity accounted for it
    fn submit<'a>(&'a self, slot: Self::Slot<'a>) {
        let MemorySlot { ring, record } = slot;
        ring.publish(record);
    }

    fn discard<'a>(&'a self, slot: Self::Slot<'a>) {
        slot.ring.drop_reserved();
    }
}
