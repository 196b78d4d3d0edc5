mod alltoall;
mod alltoall_nbi;
mod progress;
mod shmem_client;

pub use progress::ProgressContext;
pub use shmem_client::ShmemClient;
