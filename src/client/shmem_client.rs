use crate::collective::helpers::{read_signal, wait_signal};
use crate::collective::{CollectiveStrategy, PairwiseAlltoall};
use crate::config::ShmemConfig;
use crate::error::{Result, ShmemError};
use crate::group::GroupRegistry;
use crate::memory::{CompletionCounter, SymPtr, SymmetricAllocator};
use crate::transport::{CtxId, LocalFabric, LocalTransport, Transport};
use crate::types::{AlltoallElement, COUNTER_BYTES, PSYNC_BYTES, Pe, from_le_bytes, to_le_bytes};
use std::sync::Arc;
use std::time::Duration;

use super::progress::ProgressSlot;

/// The per-PE handle for symmetric memory and all-to-all exchanges.
///
/// Holds the PE's transport endpoint, its view of the symmetric heap, the
/// registry of groups resolved by blocking collectives, the strategy those
/// collectives run, and the lazily created asynchronous progress context.
///
/// # Example
///
/// ```no_run
/// use shmemx::{ShmemClient, ShmemConfig};
///
/// # fn example() -> shmemx::Result<()> {
/// let clients = ShmemClient::bootstrap_local(4, ShmemConfig::default())?;
///
/// // Each client has a unique PE number in [0, n_pes).
/// assert_eq!(clients[0].my_pe(), 0);
/// assert_eq!(clients[0].n_pes(), 4);
/// # Ok(())
/// # }
/// ```
pub struct ShmemClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: ShmemConfig,
    heap: SymmetricAllocator,
    pub(crate) groups: GroupRegistry,
    pub(crate) strategy: Arc<dyn CollectiveStrategy>,
    pub(crate) progress: ProgressSlot,
}

impl ShmemClient {
    /// Wrap one PE's transport endpoint.
    ///
    /// Blocking collectives use [`PairwiseAlltoall`] bounded by
    /// `config.collective_timeout`.
    pub fn new(transport: Arc<dyn Transport>, config: ShmemConfig) -> Self {
        let my_pe = transport.my_pe();
        let n_pes = transport.n_pes();
        Self {
            heap: SymmetricAllocator::new(config.heap_bytes),
            groups: GroupRegistry::new(my_pe, n_pes),
            strategy: Arc::new(PairwiseAlltoall::new(config.collective_timeout)),
            progress: ProgressSlot::default(),
            transport,
            config,
        }
    }

    /// Replace the blocking all-to-all strategy.
    pub fn with_strategy(mut self, strategy: Arc<dyn CollectiveStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Start an in-process job of `n_pes` PEs and return one client per PE.
    ///
    /// The fabric advertises asynchronous progress when
    /// `config.async_progress` is set, ticking at `config.progress_tick`
    /// (1 ms if unset).
    pub fn bootstrap_local(n_pes: u32, config: ShmemConfig) -> Result<Vec<ShmemClient>> {
        let mut builder = LocalFabric::builder(n_pes).heap_bytes(config.heap_bytes);
        if config.async_progress {
            builder =
                builder.async_progress(config.progress_tick.unwrap_or(Duration::from_millis(1)));
        }
        Ok(Self::from_transports(builder.build()?, config))
    }

    /// One client per endpoint of an already built local fabric.
    pub fn from_transports(
        transports: Vec<LocalTransport>,
        config: ShmemConfig,
    ) -> Vec<ShmemClient> {
        transports
            .into_iter()
            .map(|t| ShmemClient::new(Arc::new(t), config.clone()))
            .collect()
    }

    pub fn my_pe(&self) -> Pe {
        self.transport.my_pe()
    }

    pub fn n_pes(&self) -> u32 {
        self.transport.n_pes()
    }

    pub fn config(&self) -> &ShmemConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    // ── Symmetric memory ────────────────────────────────────────────

    /// Allocate `len` bytes of symmetric memory.
    ///
    /// Must be called in the same order with the same sizes on every PE so
    /// the returned pointer names the same object everywhere.
    pub fn alloc(&self, len: usize) -> Result<SymPtr> {
        self.heap.alloc(len, 8)
    }

    /// Allocate room for `n` elements of `T`.
    pub fn alloc_array<T: AlltoallElement>(&self, n: usize) -> Result<SymPtr> {
        let len = n.checked_mul(T::WIDTH).ok_or(ShmemError::HeapExhausted {
            requested: usize::MAX,
            available: self.heap.capacity().saturating_sub(self.heap.used()),
        })?;
        self.heap.alloc(len, T::WIDTH)
    }

    /// Allocate a completion counter for [`alltoallmem_nbi`](Self::alltoallmem_nbi).
    pub fn alloc_counter(&self) -> Result<CompletionCounter> {
        CompletionCounter::new(self.heap.alloc(COUNTER_BYTES, COUNTER_BYTES)?)
    }

    /// Allocate a `pSync` word for the blocking all-to-all.
    pub fn alloc_psync(&self) -> Result<SymPtr> {
        self.heap.alloc(PSYNC_BYTES, PSYNC_BYTES)
    }

    /// Copy `data` into local symmetric memory at `dest`.
    pub fn write_bytes(&self, dest: SymPtr, data: &[u8]) -> Result<()> {
        self.transport.write_local(dest, data)
    }

    /// Read the whole of local symmetric object `src`.
    pub fn read_bytes(&self, src: SymPtr) -> Result<Vec<u8>> {
        let mut out = vec![0u8; src.len()];
        self.transport.read_local(src, &mut out)?;
        Ok(out)
    }

    /// Store `values` little-endian into local symmetric memory at `dest`.
    pub fn write_slice<T: AlltoallElement>(&self, dest: SymPtr, values: &[T]) -> Result<()> {
        self.write_bytes(dest, &to_le_bytes(values))
    }

    /// Load local symmetric object `src` as elements of `T`.
    pub fn read_slice<T: AlltoallElement>(&self, src: SymPtr) -> Result<Vec<T>> {
        Ok(from_le_bytes(&self.read_bytes(src)?))
    }

    // ── Completion ──────────────────────────────────────────────────

    /// Contexts this client issues on: the default one, plus the progress
    /// context once it exists.
    fn contexts(&self) -> Vec<CtxId> {
        let mut ctxs = vec![CtxId::DEFAULT];
        if let Some(pc) = self.progress_context() {
            ctxs.push(pc.ctx());
        }
        ctxs
    }

    /// Complete every operation this PE has issued.
    pub fn quiet(&self) -> Result<()> {
        for ctx in self.contexts() {
            self.transport.quiet(ctx)?;
        }
        Ok(())
    }

    /// Current value of the local copy of `counter`.
    pub fn counter_value(&self, counter: &CompletionCounter) -> Result<i32> {
        Ok(read_signal(self.transport.as_ref(), counter.ptr())? as i32)
    }

    /// Wait until the local copy of `counter` reaches `expected`.
    ///
    /// Drives progress on this PE's contexts while waiting, so peers that
    /// are themselves waiting still see this PE's deliveries.
    pub fn wait_counter(
        &self,
        counter: &CompletionCounter,
        expected: i32,
        timeout: Duration,
    ) -> Result<i32> {
        let v = wait_signal(
            self.transport.as_ref(),
            &self.contexts(),
            counter.ptr(),
            timeout,
            "wait_counter",
            |v| v >= expected as i64,
        )?;
        Ok(v as i32)
    }

    /// Groups currently resolved by in-flight blocking collectives.
    pub fn live_groups(&self) -> usize {
        self.groups.live_groups()
    }
}
