//! In-process fabric: every PE of the job lives in this process.
//!
//! Each PE owns a symmetric heap. One-sided operations are validated when
//! issued, queued on their context, and applied to the target heap when the
//! context is progressed or quieted. This mirrors how an RDMA NIC accepts
//! work requests immediately and completes them later.

use crate::error::{Result, ShmemError};
use crate::memory::SymPtr;
use crate::transport::op_queue::{ContextQueue, PendingOp};
use crate::transport::{ContextStats, CtxFlags, CtxId, Transport, TransportCaps};
use crate::types::Pe;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Default symmetric heap per PE: 4 MiB.
const DEFAULT_HEAP_BYTES: usize = 4 * 1024 * 1024;

/// Contexts per PE, including the default one.
const DEFAULT_MAX_CONTEXTS: usize = 64;

/// Symmetric heaps shared by all PEs of an in-process job.
pub struct LocalFabric {
    heaps: Vec<Mutex<Box<[u8]>>>,
    heap_bytes: usize,
    caps: TransportCaps,
    max_contexts: usize,
}

impl LocalFabric {
    /// Start configuring a fabric of `n_pes` PEs.
    pub fn builder(n_pes: u32) -> LocalFabricBuilder {
        LocalFabricBuilder {
            n_pes,
            heap_bytes: DEFAULT_HEAP_BYTES,
            caps: TransportCaps::default(),
            max_contexts: DEFAULT_MAX_CONTEXTS,
        }
    }

    fn heap(&self, pe: Pe) -> Result<std::sync::MutexGuard<'_, Box<[u8]>>> {
        self.heaps[pe as usize]
            .lock()
            .map_err(|_| ShmemError::LockPoisoned("symmetric heap"))
    }

    fn apply(&self, op: PendingOp) -> Result<()> {
        match op {
            PendingOp::Put { pe, dest, data } => {
                let mut heap = self.heap(pe)?;
                heap[dest.offset()..dest.offset() + data.len()].copy_from_slice(&data);
            }
            PendingOp::AtomicAdd { pe, dest, value } => {
                let mut heap = self.heap(pe)?;
                let word = &mut heap[dest.offset()..dest.end()];
                match dest.len() {
                    4 => {
                        let mut raw = [0u8; 4];
                        raw.copy_from_slice(word);
                        let cur = i32::from_le_bytes(raw);
                        word.copy_from_slice(&cur.wrapping_add(value as i32).to_le_bytes());
                    }
                    _ => {
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(word);
                        let cur = i64::from_le_bytes(raw);
                        word.copy_from_slice(&cur.wrapping_add(value).to_le_bytes());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`LocalFabric`].
pub struct LocalFabricBuilder {
    n_pes: u32,
    heap_bytes: usize,
    caps: TransportCaps,
    max_contexts: usize,
}

impl LocalFabricBuilder {
    /// Symmetric heap size per PE.
    pub fn heap_bytes(mut self, bytes: usize) -> Self {
        self.heap_bytes = bytes;
        self
    }

    /// Advertise asynchronous progress driven every `tick`.
    pub fn async_progress(mut self, tick: Duration) -> Self {
        self.caps = TransportCaps {
            async_progress: true,
            async_tick: tick,
        };
        self
    }

    /// Limit on contexts per PE, counting the default context.
    pub fn max_contexts(mut self, n: usize) -> Self {
        self.max_contexts = n.max(1);
        self
    }

    /// Allocate the heaps and return one transport per PE, in rank order.
    pub fn build(self) -> Result<Vec<LocalTransport>> {
        if self.n_pes == 0 {
            return Err(ShmemError::InvalidPe { pe: 0, n_pes: 0 });
        }
        let fabric = Arc::new(LocalFabric {
            heaps: (0..self.n_pes)
                .map(|_| Mutex::new(vec![0u8; self.heap_bytes].into_boxed_slice()))
                .collect(),
            heap_bytes: self.heap_bytes,
            caps: self.caps,
            max_contexts: self.max_contexts,
        });
        tracing::debug!(
            n_pes = self.n_pes,
            heap_bytes = self.heap_bytes,
            async_progress = self.caps.async_progress,
            "local fabric up"
        );
        Ok((0..self.n_pes)
            .map(|pe| LocalTransport::new(pe, Arc::clone(&fabric)))
            .collect())
    }
}

/// One PE's endpoint on a [`LocalFabric`].
pub struct LocalTransport {
    pe: Pe,
    fabric: Arc<LocalFabric>,
    contexts: RwLock<HashMap<CtxId, Arc<ContextQueue>>>,
    next_ctx: AtomicU32,
}

impl LocalTransport {
    fn new(pe: Pe, fabric: Arc<LocalFabric>) -> Self {
        let mut contexts = HashMap::new();
        contexts.insert(CtxId::DEFAULT, Arc::new(ContextQueue::new()));
        Self {
            pe,
            fabric,
            contexts: RwLock::new(contexts),
            next_ctx: AtomicU32::new(CtxId::DEFAULT.raw() + 1),
        }
    }

    /// Number of live contexts on this PE, including the default one.
    pub fn context_count(&self) -> usize {
        self.contexts.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Issue/retire counters for `ctx`, if it exists.
    pub fn stats(&self, ctx: CtxId) -> Option<ContextStats> {
        self.context(ctx).ok().map(|q| q.stats())
    }

    /// Operations issued on `ctx` that have not reached their target yet.
    pub fn pending(&self, ctx: CtxId) -> usize {
        self.context(ctx).map(|q| q.pending()).unwrap_or(0)
    }

    fn context(&self, ctx: CtxId) -> Result<Arc<ContextQueue>> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| ShmemError::LockPoisoned("context table"))?;
        contexts
            .get(&ctx)
            .cloned()
            .ok_or_else(|| ShmemError::transport_op("context", self.pe, format!("unknown {ctx}")))
    }

    fn check_target(&self, op: &'static str, dest: SymPtr, pe: Pe) -> Result<()> {
        let n_pes = self.fabric.heaps.len() as u32;
        if pe >= n_pes {
            return Err(ShmemError::transport_op(
                op,
                pe,
                format!("no such PE (job has {n_pes})"),
            ));
        }
        if dest.end() > self.fabric.heap_bytes {
            return Err(ShmemError::transport_op(
                op,
                pe,
                format!(
                    "remote address {dest} outside {}-byte heap",
                    self.fabric.heap_bytes
                ),
            ));
        }
        Ok(())
    }

    fn check_local(&self, ptr: SymPtr) -> Result<()> {
        if ptr.end() > self.fabric.heap_bytes {
            return Err(ShmemError::OutOfBounds {
                offset: ptr.offset(),
                len: ptr.len(),
                limit: self.fabric.heap_bytes,
            });
        }
        Ok(())
    }
}

impl Transport for LocalTransport {
    fn my_pe(&self) -> Pe {
        self.pe
    }

    fn n_pes(&self) -> u32 {
        self.fabric.heaps.len() as u32
    }

    fn caps(&self) -> TransportCaps {
        self.fabric.caps
    }

    fn ctx_create(&self, flags: CtxFlags) -> Result<CtxId> {
        let mut contexts = self
            .contexts
            .write()
            .map_err(|_| ShmemError::LockPoisoned("context table"))?;
        if contexts.len() >= self.fabric.max_contexts {
            return Err(ShmemError::context_creation(format!(
                "PE {} already has {} contexts (limit {})",
                self.pe,
                contexts.len(),
                self.fabric.max_contexts
            )));
        }
        let id = CtxId::new(self.next_ctx.fetch_add(1, Ordering::Relaxed));
        contexts.insert(id, Arc::new(ContextQueue::new()));
        tracing::debug!(pe = self.pe, ctx = %id, flags = flags.bits(), "context created");
        Ok(id)
    }

    fn put_nb(&self, ctx: CtxId, dest: SymPtr, src: SymPtr, pe: Pe) -> Result<()> {
        let queue = self.context(ctx)?;
        if dest.len() < src.len() {
            return Err(ShmemError::transport_op(
                "put_nb",
                pe,
                format!("destination {dest} smaller than source {src}"),
            ));
        }
        self.check_target("put_nb", dest, pe)?;
        let mut data = vec![0u8; src.len()];
        self.read_local(src, &mut data)
            .map_err(|e| ShmemError::transport_op("put_nb", pe, e.to_string()))?;
        queue.push(PendingOp::Put { pe, dest, data });
        Ok(())
    }

    fn fence(&self, ctx: CtxId) -> Result<()> {
        self.context(ctx)?.record_fence();
        Ok(())
    }

    fn atomic_add(&self, ctx: CtxId, dest: SymPtr, value: i64, pe: Pe) -> Result<()> {
        let queue = self.context(ctx)?;
        if !matches!(dest.len(), 4 | 8) {
            return Err(ShmemError::transport_op(
                "atomic_add",
                pe,
                format!("unsupported atomic width {}", dest.len()),
            ));
        }
        self.check_target("atomic_add", dest, pe)?;
        queue.push(PendingOp::AtomicAdd { pe, dest, value });
        Ok(())
    }

    fn progress(&self, ctx: CtxId) -> Result<usize> {
        self.context(ctx)?.drain(false, |op| self.fabric.apply(op))
    }

    fn quiet(&self, ctx: CtxId) -> Result<()> {
        self.context(ctx)?.drain(true, |op| self.fabric.apply(op))?;
        Ok(())
    }

    fn read_local(&self, src: SymPtr, out: &mut [u8]) -> Result<()> {
        self.check_local(src)?;
        if out.len() < src.len() {
            return Err(ShmemError::BufferTooSmall {
                required: src.len(),
                actual: out.len(),
            });
        }
        let heap = self.fabric.heap(self.pe)?;
        out[..src.len()].copy_from_slice(&heap[src.offset()..src.end()]);
        Ok(())
    }

    fn write_local(&self, dest: SymPtr, data: &[u8]) -> Result<()> {
        self.check_local(dest)?;
        if data.len() > dest.len() {
            return Err(ShmemError::BufferTooSmall {
                required: data.len(),
                actual: dest.len(),
            });
        }
        let mut heap = self.fabric.heap(self.pe)?;
        heap[dest.offset()..dest.offset() + data.len()].copy_from_slice(data);
        Ok(())
    }
}
