use crate::error::{Result, ShmemError};
use crate::group::Group;
use crate::memory::SymPtr;
use crate::transport::Transport;

/// All-to-all algorithm requested from a [`CollectiveStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum Algorithm {
    /// Whatever the strategy considers best.
    #[default]
    Default,
}

/// One blocking all-to-all over symmetric buffers.
///
/// Element `k` of the block member `i` sends to member `j` is read from
/// `source[sst * (j * nelems + k)]` on `i` and lands in
/// `target[dst * (i * nelems + k)]` on `j`. Strides count elements.
#[derive(Debug, Clone, Copy)]
pub struct AlltoallArgs {
    pub target: SymPtr,
    pub source: SymPtr,
    pub dst_stride: usize,
    pub src_stride: usize,
    pub nelems: usize,
    pub elem_size: usize,
    /// Symmetric 64-bit word used to signal delivery.
    pub psync: SymPtr,
}

impl AlltoallArgs {
    /// Bytes a buffer must span for `pe_size` blocks at `stride`.
    ///
    /// Fails with `InvalidArgument` when the span does not fit a `usize`.
    pub fn required_bytes(&self, stride: usize, pe_size: u32) -> Result<usize> {
        let elems = (pe_size as usize)
            .checked_mul(self.nelems)
            .ok_or_else(|| overflow("nelems", "element count"))?;
        if elems == 0 {
            return Ok(0);
        }
        (elems - 1)
            .checked_mul(stride)
            .and_then(|last| last.checked_add(1))
            .and_then(|n| n.checked_mul(self.elem_size))
            .ok_or_else(|| overflow("stride", "buffer span"))
    }

    /// Byte offset of element `k` of block `block` at `stride`.
    pub fn element_offset(&self, stride: usize, block: usize, k: usize) -> Result<usize> {
        block
            .checked_mul(self.nelems)
            .and_then(|i| i.checked_add(k))
            .and_then(|i| i.checked_mul(stride))
            .and_then(|i| i.checked_mul(self.elem_size))
            .ok_or_else(|| overflow("stride", "element offset"))
    }

    /// Bytes in one contiguous block.
    pub fn block_bytes(&self) -> Result<usize> {
        self.nelems
            .checked_mul(self.elem_size)
            .ok_or_else(|| overflow("nelems", "block size"))
    }
}

fn overflow(name: &'static str, what: &str) -> ShmemError {
    ShmemError::InvalidArgument {
        name,
        reason: format!("{what} overflows usize"),
    }
}

/// Blocking all-to-all engine used by the synchronous entry points.
pub trait CollectiveStrategy: Send + Sync {
    fn alltoall(
        &self,
        transport: &dyn Transport,
        group: &Group,
        args: &AlltoallArgs,
        algorithm: Algorithm,
    ) -> Result<()>;
}
