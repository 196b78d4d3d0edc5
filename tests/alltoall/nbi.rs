use super::helpers::{WAIT, config, run_clients, run_pes, tag};
use shmemx::{CtxId, LocalFabric, LocalTransport, ShmemClient, ShmemConfig, ShmemError};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn async_config() -> ShmemConfig {
    ShmemConfig {
        async_progress: true,
        progress_tick: Some(Duration::from_micros(200)),
        ..config()
    }
}

/// Spin on the local counter without driving progress from this thread.
fn await_counter_passively(c: &ShmemClient, counter: &shmemx::CompletionCounter, want: i32) {
    let deadline = Instant::now() + WAIT;
    while c.counter_value(counter).unwrap() < want {
        assert!(Instant::now() < deadline, "PE {} never reached {want}", c.my_pe());
        std::thread::sleep(Duration::from_micros(100));
    }
}

#[test]
fn test_four_pes_eight_byte_blocks() {
    let n = 4;
    run_pes(n, config(), |c, barrier| {
        let me = c.my_pe();
        let src = c.alloc_array::<u64>(n as usize).unwrap();
        let dst = c.alloc_array::<u64>(n as usize).unwrap();
        let counter = c.alloc_counter().unwrap();

        let data: Vec<u64> = (0..n).map(|to| tag(me, to, 0)).collect();
        c.write_slice(src, &data).unwrap();
        barrier.wait();

        c.alltoallmem_nbi(dst, src, 8, &counter).unwrap();
        assert_eq!(c.wait_counter(&counter, n as i32, WAIT).unwrap(), n as i32);

        let want: Vec<u64> = (0..n).map(|from| tag(from, me, 0)).collect();
        assert_eq!(c.read_slice::<u64>(dst).unwrap(), want, "PE {me}");
        barrier.wait();
        assert_eq!(c.counter_value(&counter).unwrap(), n as i32);
    });
}

#[test]
fn test_one_fence_per_peer_on_default_context() {
    let n = 4;
    let transports: Vec<Arc<LocalTransport>> = LocalFabric::builder(n)
        .heap_bytes(config().heap_bytes)
        .build()
        .unwrap()
        .into_iter()
        .map(Arc::new)
        .collect();
    let clients: Vec<_> = transports
        .iter()
        .map(|t| ShmemClient::new(t.clone(), config()))
        .collect();

    run_clients(&clients, |c, barrier| {
        let buf = c.alloc_array::<u64>(n as usize).unwrap();
        let counter = c.alloc_counter().unwrap();
        barrier.wait();
        c.alltoallmem_nbi(buf, buf, 8, &counter).unwrap();
        c.quiet().unwrap();
        c.wait_counter(&counter, n as i32, WAIT).unwrap();
    });

    for (pe, t) in transports.iter().enumerate() {
        let stats = t.stats(CtxId::DEFAULT).unwrap();
        let n = n as u64;
        assert_eq!(
            (stats.puts, stats.fences, stats.atomics, stats.retired),
            (n, n, n, 2 * n),
            "PE {pe}"
        );
        assert_eq!(t.pending(CtxId::DEFAULT), 0);
        assert_eq!(t.context_count(), 1);
    }
}

#[test]
fn test_single_pe_delivers_to_itself() {
    run_pes(1, config(), |c, _| {
        let src = c.alloc(16).unwrap();
        let dst = c.alloc(16).unwrap();
        let counter = c.alloc_counter().unwrap();
        c.write_bytes(src, b"sixteen bytes!!!").unwrap();

        c.alltoallmem_nbi(dst, src, 16, &counter).unwrap();
        c.quiet().unwrap();

        assert_eq!(c.counter_value(&counter).unwrap(), 1);
        assert_eq!(c.read_bytes(dst).unwrap(), b"sixteen bytes!!!");
    });
}

#[test]
fn test_typed_exchange_three_pes() {
    let n = 3;
    let nelems = 2;
    run_pes(n, config(), |c, barrier| {
        let me = c.my_pe() as i32;
        let len = n as usize * nelems;
        let src = c.alloc_array::<i32>(len).unwrap();
        let dst = c.alloc_array::<i32>(len).unwrap();
        let counter = c.alloc_counter().unwrap();

        // Block for PE q is [-(10*me + q), 10*me + q].
        let data: Vec<i32> = (0..n as i32)
            .flat_map(|q| [-(10 * me + q), 10 * me + q])
            .collect();
        c.write_slice(src, &data).unwrap();
        barrier.wait();

        c.alltoall_nbi::<i32>(dst, src, nelems, &counter).unwrap();
        c.wait_counter(&counter, n as i32, WAIT).unwrap();

        let want: Vec<i32> = (0..n as i32)
            .flat_map(|p| [-(10 * p + me), 10 * p + me])
            .collect();
        assert_eq!(c.read_slice::<i32>(dst).unwrap(), want);
    });
}

#[test]
fn test_zero_size_blocks_still_count() {
    run_pes(3, config(), |c, _| {
        let buf = c.alloc(8).unwrap();
        let counter = c.alloc_counter().unwrap();
        c.alltoallmem_nbi(buf, buf, 0, &counter).unwrap();
        c.wait_counter(&counter, 3, WAIT).unwrap();
    });
}

#[test]
fn test_async_progress_delivers_without_quiet() {
    let n = 4;
    let results = run_pes(n, async_config(), |c, barrier| {
        let me = c.my_pe();
        let src = c.alloc_array::<u32>(n as usize).unwrap();
        let dst = c.alloc_array::<u32>(n as usize).unwrap();
        let counter = c.alloc_counter().unwrap();
        c.write_slice(src, &(0..n).map(|to| me * 10 + to).collect::<Vec<_>>())
            .unwrap();
        barrier.wait();

        c.alltoall_nbi::<u32>(dst, src, 1, &counter).unwrap();
        await_counter_passively(c, &counter, n as i32);

        let want: Vec<u32> = (0..n).map(|from| from * 10 + me).collect();
        assert_eq!(c.read_slice::<u32>(dst).unwrap(), want);
        let pc = c.progress_context().expect("progress context created");
        pc.ticks()
    });
    assert!(results.iter().all(|&ticks| ticks > 0));
}

#[test]
fn test_progress_context_created_once() {
    let n = 2;
    run_pes(n, async_config(), |c, barrier| {
        let src = c.alloc_array::<u64>(n as usize).unwrap();
        let dst = c.alloc_array::<u64>(n as usize).unwrap();
        let counter = c.alloc_counter().unwrap();
        assert!(c.progress_context().is_none());

        let mut seen = Vec::new();
        for round in 1..=3 {
            barrier.wait();
            c.alltoallmem_nbi(dst, src, 8, &counter).unwrap();
            await_counter_passively(c, &counter, round * n as i32);
            let pc = c.progress_context().unwrap();
            seen.push((pc as *const _ as usize, pc.ctx()));
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]), "{seen:?}");
    });
}

#[test]
fn test_async_disabled_by_config_uses_default_context() {
    let cfg = ShmemConfig {
        async_progress: false,
        ..async_config()
    };
    run_pes(2, cfg, |c, _| {
        let buf = c.alloc(16).unwrap();
        let counter = c.alloc_counter().unwrap();
        c.alltoallmem_nbi(buf, buf, 8, &counter).unwrap();
        c.wait_counter(&counter, 2, WAIT).unwrap();
        assert!(c.progress_context().is_none());
    });
}

#[test]
fn test_context_limit_fails_before_issue() {
    let t = Arc::new(
        LocalFabric::builder(1)
            .heap_bytes(config().heap_bytes)
            .async_progress(Duration::from_micros(200))
            .max_contexts(1)
            .build()
            .unwrap()
            .remove(0),
    );
    let c = ShmemClient::new(t.clone(), async_config());
    let buf = c.alloc(16).unwrap();
    let counter = c.alloc_counter().unwrap();

    let err = c.alltoallmem_nbi(buf, buf, 16, &counter).unwrap_err();
    assert!(matches!(err, ShmemError::ContextCreation { .. }), "{err}");
    assert!(c.progress_context().is_none());
    assert_eq!(t.pending(CtxId::DEFAULT), 0);
    assert_eq!(t.stats(CtxId::DEFAULT).unwrap().puts, 0);
    assert_eq!(c.counter_value(&counter).unwrap(), 0);
}

#[tokio::test]
async fn test_client_dropped_inside_async_context() {
    let clients = ShmemClient::bootstrap_local(2, async_config()).unwrap();
    let c = &clients[0];
    let buf = c.alloc(16).unwrap();
    let counter = c.alloc_counter().unwrap();
    c.alltoallmem_nbi(buf, buf, 8, &counter).unwrap();
    assert!(c.progress_context().is_some());
    drop(clients);
}
