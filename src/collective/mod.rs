mod alltoall;
pub(crate) mod helpers;
mod schedule;
mod strategy;

pub use alltoall::PairwiseAlltoall;
pub use schedule::{RingSchedule, ring_schedule};
pub use strategy::{Algorithm, AlltoallArgs, CollectiveStrategy};
