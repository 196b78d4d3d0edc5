use crate::collective::helpers::wait_signal;
use crate::collective::schedule::ring_schedule;
use crate::collective::strategy::{Algorithm, AlltoallArgs, CollectiveStrategy};
use crate::error::{Result, ShmemError};
use crate::group::Group;
use crate::transport::{CtxId, Transport};
use crate::types::PSYNC_BYTES;
use std::time::Duration;

/// Default upper bound on waiting for the other members' blocks.
const COLLECTIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Put-based pairwise all-to-all.
///
/// Each member walks the group in rotated order, puts its block for that
/// member (one put per block when both strides are 1, one per element
/// otherwise), fences, and bumps the member's `pSync` word. It then quiets,
/// waits until its own `pSync` has been bumped by every member, and
/// subtracts the group size so the word is back at its starting value.
#[derive(Debug, Clone)]
pub struct PairwiseAlltoall {
    timeout: Duration,
}

impl PairwiseAlltoall {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for PairwiseAlltoall {
    fn default() -> Self {
        Self::new(COLLECTIVE_TIMEOUT)
    }
}

impl CollectiveStrategy for PairwiseAlltoall {
    fn alltoall(
        &self,
        transport: &dyn Transport,
        group: &Group,
        args: &AlltoallArgs,
        _algorithm: Algorithm,
    ) -> Result<()> {
        let ctx = CtxId::DEFAULT;
        let me = group.my_index() as usize;
        let size = group.size();
        let w = args.elem_size;
        let block = args.block_bytes()?;

        if args.psync.len() != PSYNC_BYTES {
            return Err(ShmemError::BufferTooSmall {
                required: PSYNC_BYTES,
                actual: args.psync.len(),
            });
        }

        for j in ring_schedule(me as u32, size) {
            let pe = group.member(j);
            let j = j as usize;
            if args.dst_stride == 1 && args.src_stride == 1 {
                if block > 0 {
                    let src = args.source.slice(args.element_offset(1, j, 0)?, block)?;
                    let dest = args.target.slice(args.element_offset(1, me, 0)?, block)?;
                    transport.put_nb(ctx, dest, src, pe)?;
                }
            } else {
                for k in 0..args.nelems {
                    let src = args
                        .source
                        .slice(args.element_offset(args.src_stride, j, k)?, w)?;
                    let dest = args
                        .target
                        .slice(args.element_offset(args.dst_stride, me, k)?, w)?;
                    transport.put_nb(ctx, dest, src, pe)?;
                }
            }
            transport.fence(ctx)?;
            transport.atomic_add(ctx, args.psync, 1, pe)?;
        }
        transport.quiet(ctx)?;

        let my_pe = transport.my_pe();
        wait_signal(transport, &[ctx], args.psync, self.timeout, "alltoall", |v| {
            v >= size as i64
        })
        .map_err(|e| match e {
            ShmemError::Timeout { .. } => ShmemError::CollectiveFailed {
                operation: "alltoall",
                pe: my_pe,
                reason: e.to_string(),
            },
            other => other,
        })?;

        transport.atomic_add(ctx, args.psync, -(size as i64), my_pe)?;
        transport.quiet(ctx)
    }
}
