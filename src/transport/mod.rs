//! One-sided transport capability.
//!
//! The exchange engines only ever talk to a [`Transport`]: non-blocking puts,
//! per-context fences, remote atomic adds, and context management. Backends
//! (RDMA verbs, shared memory, the in-process [`LocalFabric`]) implement it.

mod local;
mod op_queue;

pub use local::{LocalFabric, LocalFabricBuilder, LocalTransport};
pub use op_queue::ContextStats;

use crate::error::Result;
use crate::memory::SymPtr;
use crate::types::Pe;
use std::time::Duration;

/// Identifies a communication context on a transport.
///
/// Operations issued on the same context are ordered by [`Transport::fence`]
/// and completed together by [`Transport::quiet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CtxId(u32);

impl CtxId {
    /// The context every transport provides without creation.
    pub const DEFAULT: CtxId = CtxId(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for CtxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::DEFAULT {
            f.write_str("ctx:default")
        } else {
            write!(f, "ctx:{}", self.0)
        }
    }
}

/// Options for [`Transport::ctx_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CtxFlags(u32);

impl CtxFlags {
    /// Context may be used from any thread (no options set).
    pub const SHARED: CtxFlags = CtxFlags(0);

    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// What a transport advertises about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCaps {
    /// Outstanding operations can be completed by a background timer.
    pub async_progress: bool,
    /// Interval at which the background timer should drive progress.
    pub async_tick: Duration,
}

impl Default for TransportCaps {
    fn default() -> Self {
        Self {
            async_progress: false,
            async_tick: Duration::from_millis(1),
        }
    }
}

/// One-sided communication primitives addressed by context and target PE.
///
/// `put_nb` and `atomic_add` only issue; data becomes visible at the target
/// once the context is progressed or quieted. Within a context, everything
/// issued before a `fence` to a given PE is delivered before anything issued
/// after it to the same PE.
pub trait Transport: Send + Sync + 'static {
    /// Rank of the calling PE.
    fn my_pe(&self) -> Pe;

    /// Number of PEs in the job.
    fn n_pes(&self) -> u32;

    fn caps(&self) -> TransportCaps;

    /// Create an additional communication context.
    fn ctx_create(&self, flags: CtxFlags) -> Result<CtxId>;

    /// Copy `src.len()` bytes from local symmetric `src` into `dest` on `pe`.
    fn put_nb(&self, ctx: CtxId, dest: SymPtr, src: SymPtr, pe: Pe) -> Result<()>;

    /// Order operations issued on `ctx` before the fence ahead of later ones.
    fn fence(&self, ctx: CtxId) -> Result<()>;

    /// Atomically add `value` to the integer at `dest` on `pe`.
    ///
    /// The integer width is `dest.len()` (4 or 8 bytes).
    fn atomic_add(&self, ctx: CtxId, dest: SymPtr, value: i64, pe: Pe) -> Result<()>;

    /// Retire whatever outstanding operations on `ctx` can complete now.
    /// Returns how many were retired.
    fn progress(&self, ctx: CtxId) -> Result<usize>;

    /// Block until every operation issued on `ctx` has completed.
    fn quiet(&self, ctx: CtxId) -> Result<()>;

    /// Read local symmetric memory.
    fn read_local(&self, src: SymPtr, out: &mut [u8]) -> Result<()>;

    /// Write local symmetric memory.
    fn write_local(&self, dest: SymPtr, data: &[u8]) -> Result<()>;
}
