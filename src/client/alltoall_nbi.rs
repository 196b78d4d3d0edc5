use crate::collective::ring_schedule;
use crate::error::{Result, ShmemError};
use crate::memory::{CompletionCounter, SymPtr};
use crate::types::{AlltoallElement, Pe};

use super::ShmemClient;

/// Report a failed one-sided operation against the PE it targeted.
fn transport_failure(op: &'static str, pe: Pe, e: ShmemError) -> ShmemError {
    if e.is_transport() {
        e
    } else {
        ShmemError::transport_op(op, pe, e.to_string())
    }
}

impl ShmemClient {
    /// Non-blocking all-to-all of `size`-byte blocks across every PE.
    ///
    /// Block `q` of `source` goes to PE `q`, landing at block `my_pe` of its
    /// `target`. Each block is followed by a fence and a 32-bit atomic
    /// increment of `counter` on the receiving PE, so once PE `p`'s counter
    /// has risen by `n_pes`, every block destined for `p` has arrived. This
    /// PE's own block counts too.
    ///
    /// Returns once every operation is issued. Delivery is completed by the
    /// progress timer when the transport supports it, or by [`quiet`] /
    /// [`wait_counter`] on this PE.
    ///
    /// If any operation fails to issue the error is returned immediately.
    /// Blocks already issued to earlier peers are not recalled.
    ///
    /// [`quiet`]: ShmemClient::quiet
    /// [`wait_counter`]: ShmemClient::wait_counter
    pub fn alltoallmem_nbi(
        &self,
        target: SymPtr,
        source: SymPtr,
        size: usize,
        counter: &CompletionCounter,
    ) -> Result<()> {
        let me = self.my_pe();
        let n = self.n_pes();
        let span = size
            .checked_mul(n as usize)
            .ok_or_else(|| ShmemError::InvalidArgument {
                name: "size",
                reason: format!("{size} x {n} PEs overflows"),
            })?;
        target.ensure_len(span)?;
        source.ensure_len(span)?;

        let ctx = self.select_context()?;
        let t = self.transport.as_ref();

        for dst_pe in ring_schedule(me, n) {
            let dest = target.slice(me as usize * size, size)?;
            let src = source.slice(dst_pe as usize * size, size)?;
            t.put_nb(ctx, dest, src, dst_pe)
                .map_err(|e| transport_failure("put_nb", dst_pe, e))?;
            t.fence(ctx)
                .map_err(|e| transport_failure("fence", dst_pe, e))?;
            t.atomic_add(ctx, counter.ptr(), 1, dst_pe)
                .map_err(|e| transport_failure("atomic_add", dst_pe, e))?;
            tracing::trace!(pe = me, dst_pe, ctx = %ctx, size, "block issued");
        }
        Ok(())
    }

    /// Typed form of [`alltoallmem_nbi`](Self::alltoallmem_nbi): blocks of
    /// `nelems` elements of `T`.
    pub fn alltoall_nbi<T: AlltoallElement>(
        &self,
        target: SymPtr,
        source: SymPtr,
        nelems: usize,
        counter: &CompletionCounter,
    ) -> Result<()> {
        let size = nelems
            .checked_mul(T::WIDTH)
            .ok_or_else(|| ShmemError::InvalidArgument {
                name: "nelems",
                reason: format!("{nelems} x {} overflows", T::NAME),
            })?;
        self.alltoallmem_nbi(target, source, size, counter)
    }
}
