use shmemx::{ShmemClient, ShmemConfig};
use std::sync::Barrier;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(10);

/// Small heap, no asynchronous progress.
pub fn config() -> ShmemConfig {
    ShmemConfig {
        async_progress: false,
        progress_tick: None,
        collective_timeout: WAIT,
        heap_bytes: 64 * 1024,
    }
}

/// Run `f` once per PE, each on its own thread, and collect the results in
/// PE order. All clients stay alive until every PE has finished.
pub fn run_pes<F, T>(n_pes: u32, config: ShmemConfig, f: F) -> Vec<T>
where
    F: Fn(&ShmemClient, &Barrier) -> T + Sync,
    T: Send,
{
    run_clients(&ShmemClient::bootstrap_local(n_pes, config).unwrap(), f)
}

/// [`run_pes`] over clients the caller already built.
pub fn run_clients<F, T>(clients: &[ShmemClient], f: F) -> Vec<T>
where
    F: Fn(&ShmemClient, &Barrier) -> T + Sync,
    T: Send,
{
    let barrier = Barrier::new(clients.len());
    std::thread::scope(|s| {
        let handles: Vec<_> = clients
            .iter()
            .map(|c| {
                let f = &f;
                let barrier = &barrier;
                s.spawn(move || f(c, barrier))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Distinct value for element `k` of the block `from` sends to `to`.
pub fn tag(from: u32, to: u32, k: usize) -> u64 {
    from as u64 * 1_000_000 + to as u64 * 1_000 + k as u64
}
