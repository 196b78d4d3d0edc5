use crate::error::{Result, ShmemError};
use crate::memory::SymPtr;
use crate::transport::{CtxId, Transport};
use std::time::{Duration, Instant};

/// Spins between polls before the waiter starts yielding its thread.
const SPIN_POLLS: u32 = 64;

/// Read a 4- or 8-byte signal word from local symmetric memory.
pub(crate) fn read_signal(transport: &dyn Transport, word: SymPtr) -> Result<i64> {
    match word.len() {
        4 => {
            let mut raw = [0u8; 4];
            transport.read_local(word, &mut raw)?;
            Ok(i32::from_le_bytes(raw) as i64)
        }
        8 => {
            let mut raw = [0u8; 8];
            transport.read_local(word, &mut raw)?;
            Ok(i64::from_le_bytes(raw))
        }
        actual => Err(ShmemError::BufferTooSmall {
            required: 4,
            actual,
        }),
    }
}

/// Poll `word` until `done` holds, driving progress on `ctxs` meanwhile.
///
/// Returns the value that satisfied `done`, or `Timeout` once `timeout`
/// elapses.
pub(crate) fn wait_signal(
    transport: &dyn Transport,
    ctxs: &[CtxId],
    word: SymPtr,
    timeout: Duration,
    operation: &'static str,
    done: impl Fn(i64) -> bool,
) -> Result<i64> {
    let start = Instant::now();
    let mut polls = 0u32;
    loop {
        for &ctx in ctxs {
            transport.progress(ctx)?;
        }
        let v = read_signal(transport, word)?;
        if done(v) {
            return Ok(v);
        }
        if start.elapsed() >= timeout {
            return Err(ShmemError::Timeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        polls = polls.wrapping_add(1);
        if polls < SPIN_POLLS {
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }
}
