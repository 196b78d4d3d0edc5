pub mod client;
pub mod collective;
pub mod config;
pub mod error;
pub mod group;
pub mod memory;
pub mod transport;
pub mod types;

pub use client::{ProgressContext, ShmemClient};
pub use collective::{Algorithm, AlltoallArgs, CollectiveStrategy, PairwiseAlltoall};
pub use config::ShmemConfig;
pub use error::{Result, ShmemError};
pub use group::ActiveSet;
pub use memory::{CompletionCounter, SymPtr};
pub use transport::{CtxFlags, CtxId, LocalFabric, LocalTransport, Transport, TransportCaps};
pub use types::{AlltoallElement, Pe};
