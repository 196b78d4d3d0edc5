use super::helpers::{config, run_pes, tag};
use shmemx::group::Group;
use shmemx::{
    ActiveSet, Algorithm, AlltoallArgs, CollectiveStrategy, Result, ShmemClient, ShmemConfig,
    ShmemError, Transport,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Contiguous
// ============================================================================

#[test]
fn test_alltoall64_four_pes() {
    let n = 4;
    let nelems = 2;
    run_pes(n, config(), |c, barrier| {
        let me = c.my_pe();
        let src = c.alloc_array::<u64>(n as usize * nelems).unwrap();
        let dst = c.alloc_array::<u64>(n as usize * nelems).unwrap();
        let psync = c.alloc_psync().unwrap();

        let data: Vec<u64> = (0..n)
            .flat_map(|to| (0..nelems).map(move |k| tag(me, to, k)))
            .collect();
        c.write_slice(src, &data).unwrap();
        barrier.wait();

        c.alltoall64(dst, src, nelems, ActiveSet::world(n), psync)
            .unwrap();

        let got = c.read_slice::<u64>(dst).unwrap();
        let want: Vec<u64> = (0..n)
            .flat_map(|from| (0..nelems).map(move |k| tag(from, me, k)))
            .collect();
        assert_eq!(got, want, "PE {me}");
        assert_eq!(c.read_slice::<i64>(psync).unwrap(), vec![0]);
        assert_eq!(c.live_groups(), 0);
    });
}

#[test]
fn test_alltoall32_strided_active_set() {
    // PEs 1 and 3 of 4 (start 1, stride 2^1); 0 and 2 sit out.
    let set = ActiveSet::new(1, 1, 2);
    run_pes(4, config(), |c, barrier| {
        let me = c.my_pe();
        let src = c.alloc_array::<u32>(2).unwrap();
        let dst = c.alloc_array::<u32>(2).unwrap();
        let psync = c.alloc_psync().unwrap();
        c.write_slice(src, &[me * 10, me * 10 + 1]).unwrap();
        barrier.wait();

        if me % 2 == 0 {
            return;
        }
        c.alltoall32(dst, src, 1, set, psync).unwrap();
        // Member 0 is PE 1, member 1 is PE 3.
        let slot = me / 2;
        assert_eq!(c.read_slice::<u32>(dst).unwrap(), vec![10 + slot, 30 + slot]);
    });
}

#[test]
fn test_contiguous_matches_unit_strides() {
    let n = 3;
    let nelems = 3;
    let out = run_pes(n, config(), |c, barrier| {
        let me = c.my_pe();
        let len = n as usize * nelems;
        let src = c.alloc_array::<i64>(len).unwrap();
        let a = c.alloc_array::<i64>(len).unwrap();
        let b = c.alloc_array::<i64>(len).unwrap();
        let psync_a = c.alloc_psync().unwrap();
        let psync_b = c.alloc_psync().unwrap();

        let data: Vec<i64> = (0..len).map(|i| -(tag(me, 0, i) as i64)).collect();
        c.write_slice(src, &data).unwrap();
        barrier.wait();

        c.alltoall::<i64>(a, src, nelems, ActiveSet::world(n), psync_a)
            .unwrap();
        c.alltoalls::<i64>(b, src, 1, 1, nelems, ActiveSet::world(n), psync_b)
            .unwrap();
        (c.read_bytes(a).unwrap(), c.read_bytes(b).unwrap())
    });
    for (pe, (a, b)) in out.iter().enumerate() {
        assert_eq!(a, b, "PE {pe}");
        assert!(a.iter().any(|&x| x != 0));
    }
}

// ============================================================================
// Strided
// ============================================================================

#[test]
fn test_alltoalls64_strides() {
    let n = 3u32;
    let nelems = 2usize;
    let (dst, sst) = (2usize, 3usize);
    let total = n as usize * nelems;
    let src_len = (total - 1) * sst + 1;
    let dst_len = (total - 1) * dst + 1;
    const UNTOUCHED: u64 = u64::MAX;

    run_pes(n, config(), |c, barrier| {
        let me = c.my_pe();
        let src = c.alloc_array::<u64>(src_len).unwrap();
        let target = c.alloc_array::<u64>(dst_len).unwrap();
        let psync = c.alloc_psync().unwrap();

        let mut data = vec![0u64; src_len];
        for j in 0..n {
            for k in 0..nelems {
                data[sst * (j as usize * nelems + k)] = tag(me, j, k);
            }
        }
        c.write_slice(src, &data).unwrap();
        c.write_slice(target, &vec![UNTOUCHED; dst_len]).unwrap();
        barrier.wait();

        c.alltoalls64(target, src, dst, sst, nelems, ActiveSet::world(n), psync)
            .unwrap();

        let got = c.read_slice::<u64>(target).unwrap();
        for (idx, &v) in got.iter().enumerate() {
            if idx % dst == 0 {
                let pos = idx / dst;
                let (from, k) = (pos / nelems, pos % nelems);
                assert_eq!(v, tag(from as u32, me, k), "PE {me} index {idx}");
            } else {
                assert_eq!(v, UNTOUCHED, "PE {me} gap {idx} overwritten");
            }
        }
    });
}

#[test]
fn test_zero_elements_still_synchronizes() {
    run_pes(2, config(), |c, _| {
        let buf = c.alloc(8).unwrap();
        let psync = c.alloc_psync().unwrap();
        c.alltoalls32(buf, buf, 1, 1, 0, ActiveSet::world(2), psync)
            .unwrap();
        assert_eq!(c.read_slice::<i64>(psync).unwrap(), vec![0]);
    });
}

#[test]
fn test_repeated_calls_reuse_psync() {
    let n = 4;
    run_pes(n, config(), |c, barrier| {
        let me = c.my_pe();
        let src = c.alloc_array::<u32>(n as usize).unwrap();
        let dst = c.alloc_array::<u32>(n as usize).unwrap();
        let psync = c.alloc_psync().unwrap();

        for round in 0..3u32 {
            let data: Vec<u32> = (0..n).map(|to| round * 100 + me * 10 + to).collect();
            c.write_slice(src, &data).unwrap();
            barrier.wait();
            c.alltoall32(dst, src, 1, ActiveSet::world(n), psync)
                .unwrap();
            let want: Vec<u32> = (0..n).map(|from| round * 100 + from * 10 + me).collect();
            assert_eq!(c.read_slice::<u32>(dst).unwrap(), want);
            assert_eq!(c.read_slice::<i64>(psync).unwrap(), vec![0]);
            barrier.wait();
        }
        assert_eq!(c.live_groups(), 0);
    });
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_caller_outside_active_set() {
    let clients = ShmemClient::bootstrap_local(2, config()).unwrap();
    let c = &clients[0];
    let buf = c.alloc_array::<u64>(1).unwrap();
    let psync = c.alloc_psync().unwrap();
    let err = c
        .alltoall64(buf, buf, 1, ActiveSet::new(1, 0, 1), psync)
        .unwrap_err();
    assert!(matches!(err, ShmemError::GroupResolution { pe_start: 1, .. }));
    assert_eq!(c.live_groups(), 0);

    // The sole member of that set can run it alone.
    let other = &clients[1];
    let buf = other.alloc_array::<u64>(1).unwrap();
    let psync = other.alloc_psync().unwrap();
    other
        .alltoall64(buf, buf, 1, ActiveSet::new(1, 0, 1), psync)
        .unwrap();
}

#[test]
fn test_missing_peer_times_out() {
    let cfg = ShmemConfig {
        collective_timeout: Duration::from_millis(50),
        ..config()
    };
    let clients = ShmemClient::bootstrap_local(2, cfg).unwrap();
    let c = &clients[0];
    let buf = c.alloc_array::<u32>(2).unwrap();
    let psync = c.alloc_psync().unwrap();
    let err = c
        .alltoall32(buf, buf, 1, ActiveSet::world(2), psync)
        .unwrap_err();
    assert!(matches!(
        err,
        ShmemError::CollectiveFailed {
            operation: "alltoall",
            pe: 0,
            ..
        }
    ));
    assert_eq!(c.live_groups(), 0);
}

/// Sees the resolved group, then fails.
struct Failing {
    calls: AtomicUsize,
}

impl CollectiveStrategy for Failing {
    fn alltoall(
        &self,
        _transport: &dyn Transport,
        group: &Group,
        args: &AlltoallArgs,
        algorithm: Algorithm,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(group.size(), 2);
        assert_eq!(algorithm, Algorithm::Default);
        assert_eq!(args.elem_size, 8);
        Err(ShmemError::CollectiveFailed {
            operation: "alltoall",
            pe: group.member(group.my_index()),
            reason: "injected".into(),
        })
    }
}

#[test]
fn test_strategy_error_propagates_and_releases_group() {
    let strategy = Arc::new(Failing {
        calls: AtomicUsize::new(0),
    });
    let c = ShmemClient::bootstrap_local(2, config())
        .unwrap()
        .remove(1)
        .with_strategy(strategy.clone());
    let buf = c.alloc_array::<i64>(2).unwrap();
    let psync = c.alloc_psync().unwrap();
    let err = c
        .alltoall::<i64>(buf, buf, 1, ActiveSet::world(2), psync)
        .unwrap_err();
    assert!(err.to_string().contains("injected"));
    assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(c.live_groups(), 0);
}
