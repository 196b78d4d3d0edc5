use crate::error::{Result, ShmemError};
use crate::memory::SymPtr;
use crate::types::COUNTER_BYTES;

/// A 32-bit symmetric word that peers atomically increment on delivery.
///
/// `alltoallmem_nbi` adds 1 to the counter on every PE it delivers to, the
/// calling PE included, so after a complete exchange on an `n`-PE job every
/// counter reads `n` more than before. Only remote adds should modify it
/// while an exchange is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionCounter(SymPtr);

impl CompletionCounter {
    /// Wrap a 4-byte symmetric object.
    pub fn new(word: SymPtr) -> Result<Self> {
        if word.len() != COUNTER_BYTES {
            return Err(ShmemError::InvalidArgument {
                name: "counter",
                reason: format!("expected {COUNTER_BYTES} bytes, got {}", word.len()),
            });
        }
        Ok(Self(word))
    }

    pub fn ptr(&self) -> SymPtr {
        self.0
    }
}
