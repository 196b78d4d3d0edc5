use crate::types::Pe;

/// Rank-rotated peer order: step `s` targets `(s + my_rank) % n`.
///
/// Each rank starts at itself and walks the ring, so at any step the ranks
/// target different peers when they run in lockstep. This only staggers the
/// traffic; ranks that drift out of step can still collide.
#[derive(Debug, Clone)]
pub struct RingSchedule {
    my_rank: u32,
    n: u32,
    step: u32,
}

impl RingSchedule {
    pub fn new(my_rank: u32, n: u32) -> Self {
        debug_assert!(n == 0 || my_rank < n);
        Self { my_rank, n, step: 0 }
    }
}

impl Iterator for RingSchedule {
    type Item = Pe;

    fn next(&mut self) -> Option<Pe> {
        if self.step >= self.n {
            return None;
        }
        let dst = ((self.step as u64 + self.my_rank as u64) % self.n as u64) as Pe;
        self.step += 1;
        Some(dst)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.n - self.step) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for RingSchedule {}

/// Peers in send order for `my_rank` in a job of `n` ranks.
pub fn ring_schedule(my_rank: u32, n: u32) -> RingSchedule {
    RingSchedule::new(my_rank, n)
}
