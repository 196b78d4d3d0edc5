/// Processing element: the rank of a participant in the job (0-indexed).
pub type Pe = u32;

/// Width in bytes of the completion counter updated by `alltoallmem_nbi`.
pub const COUNTER_BYTES: usize = std::mem::size_of::<i32>();

/// Width in bytes of one `pSync` word used by the blocking all-to-all.
pub const PSYNC_BYTES: usize = std::mem::size_of::<i64>();

mod sealed {
    pub trait Sealed {}
}

/// Element types accepted by the typed all-to-all entry points.
///
/// Only 32-bit and 64-bit integers are supported. The exchange itself is
/// byte-oriented; the type fixes the element width and how values are laid
/// out in symmetric memory (little-endian).
pub trait AlltoallElement: sealed::Sealed + Copy + Send + Sync + 'static {
    /// Element width in bytes.
    const WIDTH: usize;

    /// Name used in logs.
    const NAME: &'static str;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_element {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl AlltoallElement for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                const NAME: &'static str = stringify!($ty);

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Self::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element!(u32, i32, u64, i64);

/// Encode a slice of elements into little-endian bytes.
pub fn to_le_bytes<T: AlltoallElement>(values: &[T]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * T::WIDTH];
    for (v, chunk) in values.iter().zip(out.chunks_exact_mut(T::WIDTH)) {
        v.write_le(chunk);
    }
    out
}

/// Decode little-endian bytes into elements. Trailing partial elements are ignored.
pub fn from_le_bytes<T: AlltoallElement>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::WIDTH).map(T::read_le).collect()
}
