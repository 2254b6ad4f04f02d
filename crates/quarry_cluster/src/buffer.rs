//! Bounded best-result exchange buffer.
//!
//! Accumulates the locally discovered results worth sharing since the
//! last exchange round. Fixed capacity K: at all times the buffer holds
//! the K highest-depth records offered, realized as a min-heap over a
//! pre-allocated slab (root = current minimum). One critical section
//! serializes `offer` and `drain` across the worker's search threads.

use quarry_core::ResultRecord;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default buffer capacity
pub const DEFAULT_CAPACITY: usize = 32;

/// Outcome of offering a record to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The record was taken into the buffer
    Accepted,
    /// The record was dropped; a shallower record never evicts a deeper one
    Rejected,
}

struct Heap {
    slab: Vec<ResultRecord>,
    capacity: usize,
}

impl Heap {
    // Min-heap on depth. Sift routines keep the shallowest record at the
    // root so eviction is O(log K).
    fn sift_up(&mut self, mut child: usize) {
        while child > 0 {
            let parent = (child - 1) / 2;
            if self.slab[child].depth >= self.slab[parent].depth {
                break;
            }
            self.slab.swap(child, parent);
            child = parent;
        }
    }

    fn sift_down(&mut self, mut parent: usize) {
        loop {
            let left = 2 * parent + 1;
            let right = 2 * parent + 2;
            let mut smallest = parent;
            if left < self.slab.len() && self.slab[left].depth < self.slab[smallest].depth {
                smallest = left;
            }
            if right < self.slab.len() && self.slab[right].depth < self.slab[smallest].depth {
                smallest = right;
            }
            if smallest == parent {
                break;
            }
            self.slab.swap(parent, smallest);
            parent = smallest;
        }
    }

    fn offer(&mut self, record: ResultRecord) -> Offer {
        if self.capacity == 0 {
            return Offer::Rejected;
        }
        if self.slab.len() < self.capacity {
            self.slab.push(record);
            let last = self.slab.len() - 1;
            self.sift_up(last);
            return Offer::Accepted;
        }

        // At capacity: evict the minimum only on a strictly greater
        // depth, so on ties the existing entry stays.
        if record.depth > self.slab[0].depth {
            self.slab[0] = record;
            self.sift_down(0);
            Offer::Accepted
        } else {
            Offer::Rejected
        }
    }
}

/// Per-worker bounded top-K-by-depth send buffer
pub struct ExchangeBuffer {
    heap: Mutex<Heap>,
}

impl ExchangeBuffer {
    /// Create a buffer with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(Heap {
                slab: Vec::with_capacity(capacity),
                capacity,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a record for sharing
    ///
    /// Inserts while under capacity; at capacity the current minimum-depth
    /// entry is evicted only when the incoming depth is strictly greater.
    /// A zero-capacity buffer rejects every offer.
    pub fn offer(&self, record: ResultRecord) -> Offer {
        self.lock().offer(record)
    }

    /// Atomically remove and return all buffered records
    pub fn drain(&self) -> Vec<ResultRecord> {
        let mut heap = self.lock();
        std::mem::take(&mut heap.slab)
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.lock().slab.len()
    }

    /// Check whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The buffer's fixed capacity
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}

impl Default for ExchangeBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
