use std::time::Instant;

pub mod tags;

/// Converts elapsed time since `started_at` to microseconds, clamped to `u64::MAX`.
#[inline]
pub fn elapsed_us(started_at: Instant) -> u64 {
    started_at.elapsed().as_micros().min(u64::MAX as u128) as u64
}
