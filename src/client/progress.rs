//! Asynchronous progress: a shared context completed by a background timer.
//!
//! When the transport advertises asynchronous progress, non-blocking
//! exchanges issue on one extra context per client. A recurring tokio
//! interval retires that context's outstanding operations, so peers see
//! the data without the issuing PE calling back into the library.

use crate::error::{Result, ShmemError};
use crate::transport::{CtxFlags, CtxId, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::ShmemClient;

/// Shortest tick the timer accepts.
const MIN_TICK: Duration = Duration::from_micros(10);

/// The auxiliary context plus the timer that drives it.
///
/// The timer runs on a single-worker runtime owned by this value and stops
/// when it is dropped.
pub struct ProgressContext {
    ctx: CtxId,
    tick: Duration,
    ticks: Arc<AtomicU64>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl ProgressContext {
    /// Create the context on `transport` and arm the timer.
    pub(crate) fn start(transport: Arc<dyn Transport>, tick: Duration) -> Result<Self> {
        let tick = tick.max(MIN_TICK);
        let ctx = transport.ctx_create(CtxFlags::SHARED).map_err(|e| match e {
            ShmemError::ContextCreation { .. } => e,
            other => ShmemError::context_creation_with_source("auxiliary context", other),
        })?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("shmemx-progress")
            .enable_time()
            .build()
            .map_err(|e| ShmemError::context_creation_with_source("progress runtime", e))?;

        let ticks = Arc::new(AtomicU64::new(0));
        runtime.spawn(progress_loop(transport, ctx, tick, Arc::clone(&ticks)));
        tracing::debug!(ctx = %ctx, tick_us = tick.as_micros() as u64, "async progress armed");

        Ok(Self {
            ctx,
            tick,
            ticks,
            runtime: Some(runtime),
        })
    }

    pub fn ctx(&self) -> CtxId {
        self.ctx
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Timer firings so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for ProgressContext {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

async fn progress_loop(
    transport: Arc<dyn Transport>,
    ctx: CtxId,
    tick: Duration,
    ticks: Arc<AtomicU64>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        ticks.fetch_add(1, Ordering::Relaxed);
        match transport.progress(ctx) {
            Ok(0) => {}
            Ok(n) => tracing::trace!(ctx = %ctx, retired = n, "async progress"),
            Err(e) => tracing::warn!(ctx = %ctx, "async progress failed: {e}"),
        }
    }
}

/// Holds the progress context once it exists.
///
/// Creation is serialized by `init`, so concurrent first callers create
/// exactly one context; later callers take the lock-free path.
#[derive(Default)]
pub(crate) struct ProgressSlot {
    cell: OnceLock<Arc<ProgressContext>>,
    init: Mutex<()>,
}

impl ProgressSlot {
    pub fn get(&self) -> Option<&Arc<ProgressContext>> {
        self.cell.get()
    }

    pub fn get_or_create(
        &self,
        create: impl FnOnce() -> Result<ProgressContext>,
    ) -> Result<Arc<ProgressContext>> {
        if let Some(pc) = self.cell.get() {
            return Ok(Arc::clone(pc));
        }
        let _guard = self
            .init
            .lock()
            .map_err(|_| ShmemError::LockPoisoned("progress slot"))?;
        if let Some(pc) = self.cell.get() {
            return Ok(Arc::clone(pc));
        }
        let pc = Arc::new(create()?);
        let _ = self.cell.set(Arc::clone(&pc));
        Ok(pc)
    }
}

impl ShmemClient {
    /// Context the non-blocking exchange issues on.
    ///
    /// The shared progress context when the transport supports asynchronous
    /// progress and the config allows it (created on first use), otherwise
    /// the default context.
    pub(crate) fn select_context(&self) -> Result<CtxId> {
        let caps = self.transport.caps();
        if !(caps.async_progress && self.config.async_progress) {
            return Ok(CtxId::DEFAULT);
        }
        let tick = self.config.progress_tick.unwrap_or(caps.async_tick);
        let transport = Arc::clone(&self.transport);
        let pc = self
            .progress
            .get_or_create(|| ProgressContext::start(transport, tick))?;
        Ok(pc.ctx())
    }

    /// The asynchronous progress context, if one has been created.
    pub fn progress_context(&self) -> Option<&ProgressContext> {
        self.progress.get().map(|pc| pc.as_ref())
    }
}
