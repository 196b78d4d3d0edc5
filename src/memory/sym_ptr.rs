use crate::error::{Result, ShmemError};

/// A symmetric address: the same offset and length are valid on every PE.
///
/// Symmetric objects are allocated collectively, so a `SymPtr` obtained on
/// one PE names the corresponding object on any other PE. One-sided
/// operations pair a `SymPtr` with a target PE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymPtr {
    offset: usize,
    len: usize,
}

impl SymPtr {
    /// Create a symmetric pointer covering `len` bytes at heap `offset`.
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Byte offset within the symmetric heap.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the object in bytes.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte covered.
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Sub-range `[off, off + len)` relative to this object.
    pub fn slice(&self, off: usize, len: usize) -> Result<SymPtr> {
        match off.checked_add(len) {
            Some(end) if end <= self.len => Ok(SymPtr::new(self.offset + off, len)),
            _ => Err(ShmemError::OutOfBounds {
                offset: off,
                len,
                limit: self.len,
            }),
        }
    }

    /// Error unless the object holds at least `required` bytes.
    pub fn ensure_len(&self, required: usize) -> Result<()> {
        if self.len < required {
            return Err(ShmemError::BufferTooSmall {
                required,
                actual: self.len,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for SymPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymPtr(0x{:x}, {}B)", self.offset, self.len)
    }
}
