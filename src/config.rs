//! Runtime-configurable tuning parameters for shmemx.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `SHMEMX_`) or by constructing a custom `ShmemConfig`.

use std::time::Duration;

/// Tuning parameters for the exchange engine and the local fabric.
#[derive(Debug, Clone)]
pub struct ShmemConfig {
    /// Use the asynchronous progress context when the transport supports it.
    pub async_progress: bool,

    /// Overrides the tick interval advertised by the transport.
    pub progress_tick: Option<Duration>,

    /// Upper bound on how long the blocking all-to-all waits for peers.
    pub collective_timeout: Duration,

    /// Bytes of symmetric heap per PE.
    pub heap_bytes: usize,
}

impl Default for ShmemConfig {
    fn default() -> Self {
        Self {
            async_progress: true,
            progress_tick: None,
            collective_timeout: Duration::from_secs(30),
            heap_bytes: 4 * 1024 * 1024, // 4 MiB
        }
    }
}

impl ShmemConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `SHMEMX_ASYNC_PROGRESS` (`0`/`1`/`false`/`true`)
    /// - `SHMEMX_PROGRESS_TICK_US`
    /// - `SHMEMX_COLLECTIVE_TIMEOUT_SECS`
    /// - `SHMEMX_HEAP_BYTES`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("SHMEMX_ASYNC_PROGRESS") {
            match v.trim() {
                "1" | "true" | "on" => cfg.async_progress = true,
                "0" | "false" | "off" => cfg.async_progress = false,
                other => tracing::warn!("ignoring SHMEMX_ASYNC_PROGRESS={other}"),
            }
        }
        if let Some(v) = lookup("SHMEMX_PROGRESS_TICK_US")
            && let Ok(us) = v.parse::<u64>()
            && us > 0
        {
            cfg.progress_tick = Some(Duration::from_micros(us));
        }
        if let Some(v) = lookup("SHMEMX_COLLECTIVE_TIMEOUT_SECS")
            && let Ok(s) = v.parse::<u64>()
        {
            cfg.collective_timeout = Duration::from_secs(s);
        }
        if let Some(v) = lookup("SHMEMX_HEAP_BYTES")
            && let Ok(n) = v.parse::<usize>()
        {
            cfg.heap_bytes = n;
        }

        cfg
    }
}
