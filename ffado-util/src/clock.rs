//! Monotonic wall-clock access, grounded on `bark::time::now`: same
//! `CLOCK_MONOTONIC_RAW` source, generalised from a microsecond timestamp
//! type to raw nanoseconds since the stream-processor stack wants ticks,
//! not microseconds.

use nix::sys::time::TimeValLike;
use nix::time::ClockId;

/// Nanoseconds since an arbitrary monotonic epoch. Only deltas between two
/// calls are meaningful.
pub fn now_nanos() -> u64 {
    let timespec = nix::time::clock_gettime(ClockId::CLOCK_MONOTONIC_RAW)
        .expect("clock_gettime(CLOCK_MONOTONIC_RAW) failed, are we on Linux?");

    u64::try_from(timespec.num_nanoseconds())
        .expect("cannot convert i64 time value to u64")
}
