//! Per-context queue of issued-but-undelivered one-sided operations.
//!
//! Issuing threads push without locking; retirement is serialized by a
//! drain lock so operations reach their targets in issue order even when
//! the application thread and the progress timer drain at the same time.

use crate::error::{Result, ShmemError};
use crate::memory::SymPtr;
use crate::types::Pe;
use crossbeam_queue::SegQueue;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// An operation waiting to be applied at its target.
#[derive(Debug)]
pub(crate) enum PendingOp {
    /// Payload is captured at issue time, so the source may be reused.
    Put { pe: Pe, dest: SymPtr, data: Vec<u8> },
    AtomicAdd { pe: Pe, dest: SymPtr, value: i64 },
}

/// Counters of what has been issued and retired on one context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub puts: u64,
    pub fences: u64,
    pub atomics: u64,
    pub retired: u64,
}

pub(crate) struct ContextQueue {
    ops: SegQueue<PendingOp>,
    drain: Mutex<()>,
    puts: AtomicU64,
    fences: AtomicU64,
    atomics: AtomicU64,
    retired: AtomicU64,
}

impl ContextQueue {
    pub fn new() -> Self {
        Self {
            ops: SegQueue::new(),
            drain: Mutex::new(()),
            puts: AtomicU64::new(0),
            fences: AtomicU64::new(0),
            atomics: AtomicU64::new(0),
            retired: AtomicU64::new(0),
        }
    }

    pub fn push(&self, op: PendingOp) {
        match &op {
            PendingOp::Put { .. } => self.puts.fetch_add(1, Ordering::Relaxed),
            PendingOp::AtomicAdd { .. } => self.atomics.fetch_add(1, Ordering::Relaxed),
        };
        self.ops.push(op);
    }

    /// The queue is FIFO, so a fence needs no marker; it is only counted.
    pub fn record_fence(&self) {
        self.fences.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending(&self) -> usize {
        self.ops.len()
    }

    /// Apply queued operations in order. When `wait` is false and another
    /// thread is already draining, returns 0 immediately.
    pub fn drain(
        &self,
        wait: bool,
        mut apply: impl FnMut(PendingOp) -> Result<()>,
    ) -> Result<usize> {
        let _guard = if wait {
            self.drain
                .lock()
                .map_err(|_| ShmemError::LockPoisoned("context drain"))?
        } else {
            match self.drain.try_lock() {
                Ok(g) => g,
                Err(std::sync::TryLockError::WouldBlock) => return Ok(0),
                Err(std::sync::TryLockError::Poisoned(_)) => {
                    return Err(ShmemError::LockPoisoned("context drain"));
                }
            }
        };

        let mut n = 0;
        while let Some(op) = self.ops.pop() {
            apply(op)?;
            n += 1;
            self.retired.fetch_add(1, Ordering::Relaxed);
        }
        Ok(n)
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            puts: self.puts.load(Ordering::Relaxed),
            fences: self.fences.load(Ordering::Relaxed),
            atomics: self.atomics.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
        }
    }
}
