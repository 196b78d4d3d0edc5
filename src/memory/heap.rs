//! Collective bump allocator for the symmetric heap.
//!
//! Every PE runs the same allocation sequence, so identical requests yield
//! identical offsets everywhere. Memory is never returned; the heap lives as
//! long as the job.

use crate::error::{Result, ShmemError};
use crate::memory::SymPtr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default alignment for symmetric objects.
const MIN_ALIGN: usize = 8;

pub struct SymmetricAllocator {
    capacity: usize,
    next: AtomicUsize,
}

impl SymmetricAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next: AtomicUsize::new(0),
        }
    }

    /// Reserve `len` bytes aligned to `align` (at least 8).
    pub fn alloc(&self, len: usize, align: usize) -> Result<SymPtr> {
        let align = align.max(MIN_ALIGN).next_power_of_two();
        let mut start = 0;
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                let aligned = cur.checked_add(align - 1)? & !(align - 1);
                let end = aligned.checked_add(len)?;
                if end > self.capacity {
                    return None;
                }
                start = aligned;
                Some(end)
            })
            .map_err(|cur| ShmemError::HeapExhausted {
                requested: len,
                available: self.capacity.saturating_sub(cur),
            })?;
        Ok(SymPtr::new(start, len))
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
