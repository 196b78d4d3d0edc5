//! Blocking all-to-all entry points.
//!
//! Every typed variant funnels into one dispatch routine: check that the
//! buffers span the exchange, resolve the active set into a group for the
//! duration of the call, and hand off to the configured strategy.

use crate::collective::{Algorithm, AlltoallArgs};
use crate::error::{Result, ShmemError};
use crate::group::ActiveSet;
use crate::memory::SymPtr;
use crate::types::AlltoallElement;

use super::ShmemClient;

impl ShmemClient {
    /// Exchange `nelems` elements of `T` with every member of `set`.
    ///
    /// Member `i`'s block `j` (elements `j*nelems..(j+1)*nelems` of `source`)
    /// lands in block `i` of `target` on member `j`. `psync` is a symmetric
    /// 8-byte word, zero on entry, left zero on return. It must not be reused
    /// until every member has returned from the call.
    pub fn alltoall<T: AlltoallElement>(
        &self,
        target: SymPtr,
        source: SymPtr,
        nelems: usize,
        set: ActiveSet,
        psync: SymPtr,
    ) -> Result<()> {
        self.alltoalls::<T>(target, source, 1, 1, nelems, set, psync)
    }

    /// Strided all-to-all: `dst` and `sst` are element strides in `target`
    /// and `source`.
    ///
    /// Element `k` of the block member `i` sends to member `j` is read from
    /// `source[sst * (j*nelems + k)]` and written to
    /// `target[dst * (i*nelems + k)]`.
    #[allow(clippy::too_many_arguments)]
    pub fn alltoalls<T: AlltoallElement>(
        &self,
        target: SymPtr,
        source: SymPtr,
        dst: usize,
        sst: usize,
        nelems: usize,
        set: ActiveSet,
        psync: SymPtr,
    ) -> Result<()> {
        let args = AlltoallArgs {
            target,
            source,
            dst_stride: dst,
            src_stride: sst,
            nelems,
            elem_size: T::WIDTH,
            psync,
        };
        self.dispatch_alltoall(T::NAME, &args, set)
    }

    pub fn alltoall32(
        &self,
        target: SymPtr,
        source: SymPtr,
        nelems: usize,
        set: ActiveSet,
        psync: SymPtr,
    ) -> Result<()> {
        self.alltoall::<u32>(target, source, nelems, set, psync)
    }

    pub fn alltoall64(
        &self,
        target: SymPtr,
        source: SymPtr,
        nelems: usize,
        set: ActiveSet,
        psync: SymPtr,
    ) -> Result<()> {
        self.alltoall::<u64>(target, source, nelems, set, psync)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn alltoalls32(
        &self,
        target: SymPtr,
        source: SymPtr,
        dst: usize,
        sst: usize,
        nelems: usize,
        set: ActiveSet,
        psync: SymPtr,
    ) -> Result<()> {
        self.alltoalls::<u32>(target, source, dst, sst, nelems, set, psync)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn alltoalls64(
        &self,
        target: SymPtr,
        source: SymPtr,
        dst: usize,
        sst: usize,
        nelems: usize,
        set: ActiveSet,
        psync: SymPtr,
    ) -> Result<()> {
        self.alltoalls::<u64>(target, source, dst, sst, nelems, set, psync)
    }

    fn dispatch_alltoall(
        &self,
        elem: &'static str,
        args: &AlltoallArgs,
        set: ActiveSet,
    ) -> Result<()> {
        for (name, stride) in [("dst", args.dst_stride), ("sst", args.src_stride)] {
            if stride == 0 {
                return Err(ShmemError::InvalidArgument {
                    name,
                    reason: "stride must be positive".into(),
                });
            }
        }
        args.target
            .ensure_len(args.required_bytes(args.dst_stride, set.pe_size)?)?;
        args.source
            .ensure_len(args.required_bytes(args.src_stride, set.pe_size)?)?;

        let group = self.groups.resolve(set)?;
        let result = self.strategy.alltoall(
            self.transport.as_ref(),
            &group,
            args,
            Algorithm::Default,
        );
        drop(group);

        if let Err(e) = &result {
            tracing::error!(
                pe = self.my_pe(),
                %set,
                elem,
                nelems = args.nelems,
                "alltoall failed: {e}"
            );
        }
        result
    }
}
