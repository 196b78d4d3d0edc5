mod counter;
mod heap;
mod sym_ptr;

pub use counter::CompletionCounter;
pub use heap::SymmetricAllocator;
pub use sym_ptr::SymPtr;
