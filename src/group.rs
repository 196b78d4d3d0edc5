//! Active sets: logical PE groups described by `(pe_start, log_pe_stride, pe_size)`.
//!
//! Member `i` of a group is `pe_start + (i << log_pe_stride)`. A group is
//! resolved for the duration of one blocking collective and released when
//! its [`GroupGuard`] drops, on success and error paths alike.

use crate::error::{Result, ShmemError};
use crate::types::Pe;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Group description: `pe_size` PEs from `pe_start`, `2^log_pe_stride` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActiveSet {
    pub pe_start: Pe,
    pub log_pe_stride: u32,
    pub pe_size: u32,
}

impl ActiveSet {
    pub const fn new(pe_start: Pe, log_pe_stride: u32, pe_size: u32) -> Self {
        Self {
            pe_start,
            log_pe_stride,
            pe_size,
        }
    }

    /// Every PE of an `n_pes` job.
    pub const fn world(n_pes: u32) -> Self {
        Self::new(0, 0, n_pes)
    }
}

impl std::fmt::Display for ActiveSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, +2^{}, x{}]",
            self.pe_start, self.log_pe_stride, self.pe_size
        )
    }
}

/// A resolved group of PEs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    id: u64,
    pe_start: Pe,
    log_pe_stride: u32,
    pe_size: u32,
    my_index: u32,
}

impl Group {
    /// Registry-assigned identifier, unique for the registry's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pe_start(&self) -> Pe {
        self.pe_start
    }

    pub fn log_pe_stride(&self) -> u32 {
        self.log_pe_stride
    }

    /// The active set this group was resolved from.
    pub fn active_set(&self) -> ActiveSet {
        ActiveSet::new(self.pe_start, self.log_pe_stride, self.pe_size)
    }

    /// Number of members.
    pub fn size(&self) -> u32 {
        self.pe_size
    }

    /// Index of the calling PE within the group.
    pub fn my_index(&self) -> u32 {
        self.my_index
    }

    /// Global PE of member `index`.
    pub fn member(&self, index: u32) -> Pe {
        self.pe_start + (index << self.log_pe_stride)
    }

    /// Global PEs of all members, in group order.
    pub fn members(&self) -> impl Iterator<Item = Pe> + '_ {
        (0..self.pe_size).map(|i| self.member(i))
    }

    /// Group index of global `pe`, if it is a member.
    pub fn index_of(&self, pe: Pe) -> Option<u32> {
        let off = pe.checked_sub(self.pe_start)?;
        let stride = 1u32 << self.log_pe_stride;
        if off % stride != 0 {
            return None;
        }
        let idx = off >> self.log_pe_stride;
        (idx < self.pe_size).then_some(idx)
    }
}

/// Tracks the groups currently resolved on one PE.
pub struct GroupRegistry {
    my_pe: Pe,
    n_pes: u32,
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, ActiveSet>>,
}

impl GroupRegistry {
    pub fn new(my_pe: Pe, n_pes: u32) -> Self {
        Self {
            my_pe,
            n_pes,
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `set` into a group.
    ///
    /// Fails unless every member is a valid PE and the caller is one of them.
    pub fn resolve(&self, set: ActiveSet) -> Result<GroupGuard<'_>> {
        let ActiveSet {
            pe_start,
            log_pe_stride,
            pe_size,
        } = set;
        let fail = |reason: String| ShmemError::GroupResolution {
            pe_start,
            log_pe_stride,
            pe_size,
            reason,
        };

        if pe_size == 0 {
            return Err(fail("group is empty".into()));
        }
        if log_pe_stride >= Pe::BITS {
            return Err(fail(format!("stride 2^{log_pe_stride} does not fit a PE")));
        }
        let last = (pe_size - 1)
            .checked_shl(log_pe_stride)
            .filter(|span| span >> log_pe_stride == pe_size - 1)
            .and_then(|span| pe_start.checked_add(span))
            .ok_or_else(|| fail("member rank overflows".into()))?;
        if last >= self.n_pes {
            return Err(fail(format!(
                "last member {last} >= n_pes {}",
                self.n_pes
            )));
        }

        let mut group = Group {
            id: 0,
            pe_start,
            log_pe_stride,
            pe_size,
            my_index: 0,
        };
        group.my_index = group
            .index_of(self.my_pe)
            .ok_or_else(|| fail(format!("PE {} is not a member", self.my_pe)))?;
        group.id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.live
            .lock()
            .map_err(|_| ShmemError::LockPoisoned("group registry"))?
            .insert(group.id, set);
        tracing::debug!(pe = self.my_pe, group = group.id, %set, "group resolved");

        Ok(GroupGuard {
            registry: self,
            group,
        })
    }

    /// Number of groups resolved and not yet released.
    pub fn live_groups(&self) -> usize {
        self.live.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn release(&self, id: u64) {
        match self.live.lock() {
            Ok(mut live) => {
                live.remove(&id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&id);
            }
        }
        tracing::debug!(pe = self.my_pe, group = id, "group released");
    }
}

/// A resolved group that is released when dropped.
pub struct GroupGuard<'a> {
    registry: &'a GroupRegistry,
    group: Group,
}

impl Deref for GroupGuard<'_> {
    type Target = Group;
    fn deref(&self) -> &Group {
        &self.group
    }
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(self.group.id);
    }
}
