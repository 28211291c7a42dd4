//! Bus cycle-timer arithmetic (C1).
//!
//! The IEEE 1394 cycle timer is a 32-bit register partitioned into three
//! fields: seconds (7 bits), cycles (13 bits, 8000/s), offset (12 bits,
//! 3072 ticks/cycle). All arithmetic here is modulo the 128-second wrap
//! period; inputs are always valid cycle-timer readings, so overflow is a
//! programming error rather than a recoverable condition.

use std::ops::{Add, Sub};

use crate::{CYCLES_PER_SECOND, TICKS_PER_CYCLE, TICKS_PER_SECOND, TICKS_WRAP, SECONDS_WRAP};

/// A raw 32-bit cycle-timer reading, split into its three fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CycleTimer {
    pub seconds: u8,
    pub cycles: u16,
    pub offset: u16,
}

impl CycleTimer {
    pub const fn new(seconds: u8, cycles: u16, offset: u16) -> Self {
        CycleTimer { seconds, cycles, offset }
    }

    /// Unpack a raw 1394 CYCLE_TIMER register value.
    pub fn from_raw(raw: u32) -> Self {
        CycleTimer {
            seconds: ((raw >> 25) & 0x7f) as u8,
            cycles: ((raw >> 12) & 0x1fff) as u16,
            offset: (raw & 0xfff) as u16,
        }
    }

    pub fn to_raw(self) -> u32 {
        ((self.seconds as u32 & 0x7f) << 25)
            | ((self.cycles as u32 & 0x1fff) << 12)
            | (self.offset as u32 & 0xfff)
    }
}

/// A 64-bit tick counter with implicit wraparound every [`crate::TICKS_WRAP`]
/// ticks (128 seconds). Opaque: callers add/subtract signed cycle deltas,
/// never raw field values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_ticks(ticks: u64) -> Self {
        Timestamp(ticks % TICKS_WRAP)
    }

    pub const fn ticks(self) -> u64 {
        self.0
    }
}

/// Combine a cycle-timer reading into a tick count within the 128s wrap.
pub fn ct_to_ticks(ct: CycleTimer) -> Timestamp {
    let seconds_ticks = ct.seconds as u64 * TICKS_PER_SECOND;
    let cycle_ticks = ct.cycles as u64 * TICKS_PER_CYCLE as u64;
    Timestamp::from_ticks(seconds_ticks + cycle_ticks + ct.offset as u64)
}

/// Split a tick count back into a cycle-timer reading.
pub fn ticks_to_ct(ts: Timestamp) -> CycleTimer {
    let ticks = ts.ticks();
    let seconds = ticks / TICKS_PER_SECOND;
    let rem = ticks % TICKS_PER_SECOND;
    let cycles = rem / TICKS_PER_CYCLE as u64;
    let offset = rem % TICKS_PER_CYCLE as u64;

    CycleTimer {
        seconds: seconds as u8,
        cycles: cycles as u16,
        offset: offset as u16,
    }
}

/// Add a signed tick delta, wrapping within the 128s period.
pub fn add_ticks(ts: Timestamp, delta: i64) -> Timestamp {
    let wrap = TICKS_WRAP as i64;
    let sum = ts.ticks() as i64 + delta;
    let wrapped = sum.rem_euclid(wrap);
    Timestamp::from_ticks(wrapped as u64)
}

/// Subtract two timestamps as a signed tick delta in the range
/// (-TICKS_WRAP/2, TICKS_WRAP/2], taking the shorter way around the wrap.
pub fn sub_ticks(a: Timestamp, b: Timestamp) -> i64 {
    let wrap = TICKS_WRAP as i64;
    let raw = a.ticks() as i64 - b.ticks() as i64;
    let half = wrap / 2;
    ((raw + half).rem_euclid(wrap)) - half
}

impl Add<i64> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: i64) -> Timestamp {
        add_ticks(self, rhs)
    }
}

impl Sub for Timestamp {
    type Output = i64;
    fn sub(self, rhs: Timestamp) -> i64 {
        sub_ticks(self, rhs)
    }
}

/// Smallest signed cycle distance `a - b`, treating cycle numbers as a ring
/// of `CYCLES_PER_SECOND * SECONDS_WRAP` elements.
pub fn diff_cycles(a: u32, b: u32) -> i32 {
    let ring = CYCLES_PER_SECOND as i64 * SECONDS_WRAP as i64;
    let raw = a as i64 - b as i64;
    let half = ring / 2;
    (((raw + half).rem_euclid(ring)) - half) as i32
}

/// Recover the full tick value of a receive-side Source Packet Header,
/// which only encodes cycles+offset (25 bits), by inferring the missing
/// seconds field from the current cycle timer.
///
/// Mirrors `sphRecvToFullTicks` in the original MOTU receive stream
/// processor: if the SPH's cycle count leads `ct_now` by more than 1000
/// cycles, the SPH was stamped in the second *before* `ct_now`'s; if
/// `ct_now` leads the SPH by more than 1000 cycles, the SPH belongs to the
/// second *after*. The 1000-cycle margin is a tunable guarding against
/// packets arriving close to a seconds boundary.
pub fn sph_recv_to_full_ticks(sph: u32, ct_now: CycleTimer) -> Timestamp {
    sph_recv_to_full_ticks_with_margin(sph, ct_now, 1000)
}

pub fn sph_recv_to_full_ticks_with_margin(sph: u32, ct_now: CycleTimer, margin_cycles: i32) -> Timestamp {
    let sph_cycles = ((sph >> 12) & 0x1fff) as u32;
    let sph_offset = (sph & 0xfff) as u16;

    let now_cycles = ct_now.cycles as u32;

    let mut seconds = ct_now.seconds as i32;
    if diff_cycles(sph_cycles, now_cycles) > margin_cycles {
        seconds -= 1;
    } else if diff_cycles(now_cycles, sph_cycles) > margin_cycles {
        seconds += 1;
    }
    seconds = seconds.rem_euclid(SECONDS_WRAP as i32);

    ct_to_ticks(CycleTimer::new(seconds as u8, sph_cycles as u16, sph_offset))
}

/// Encode a full tick value as a 25-bit transmit-side Source Packet Header
/// (cycles:13 + offset:12, no seconds field).
pub fn full_ticks_to_sph(ts: Timestamp) -> u32 {
    let ct = ticks_to_ct(ts);
    ((ct.cycles as u32) << 12 | ct.offset as u32) & 0x01ff_ffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ct_ticks_round_trip_across_range() {
        for ticks in [0u64, 1, 3071, 3072, TICKS_PER_SECOND - 1, TICKS_PER_SECOND, TICKS_WRAP - 1] {
            let ts = Timestamp::from_ticks(ticks);
            let ct = ticks_to_ct(ts);
            let back = ct_to_ticks(ct);
            assert_eq!(back.ticks(), ts.ticks(), "failed for {ticks}");
        }
    }

    #[test]
    fn diff_cycles_picks_shortest_direction() {
        let ring = CYCLES_PER_SECOND as u32 * SECONDS_WRAP as u32;
        assert_eq!(diff_cycles(10, 5), 5);
        assert_eq!(diff_cycles(5, 10), -5);
        assert_eq!(diff_cycles(0, ring - 1), 1);
        assert_eq!(diff_cycles(ring - 1, 0), -1);
    }

    #[test]
    fn sph_inversion_without_wrap() {
        let base = Timestamp::from_ticks(5 * TICKS_PER_SECOND + 1234);
        let ct_now = ticks_to_ct(base);
        let sph = full_ticks_to_sph(base);
        let recovered = sph_recv_to_full_ticks(sph, ct_now);
        assert_eq!(recovered.ticks(), base.ticks());
    }

    #[test]
    fn sph_inversion_promotes_to_previous_second() {
        // ct_now is just after a seconds wrap; sph was stamped just before it.
        let ct_now = CycleTimer::new(10, 2, 100);
        let original = CycleTimer::new(9, 7999, 3000);
        let original_ticks = ct_to_ticks(original);
        let sph = full_ticks_to_sph(original_ticks);

        let recovered = sph_recv_to_full_ticks(sph, ct_now);
        assert_eq!(recovered.ticks(), original_ticks.ticks());
    }

    #[test]
    fn sph_inversion_promotes_to_next_second() {
        let ct_now = CycleTimer::new(20, 7998, 3000);
        let original = CycleTimer::new(21, 3, 50);
        let original_ticks = ct_to_ticks(original);
        let sph = full_ticks_to_sph(original_ticks);

        let recovered = sph_recv_to_full_ticks(sph, ct_now);
        assert_eq!(recovered.ticks(), original_ticks.ticks());
    }

    #[test]
    fn sph_inversion_near_wrap_quickcheck_like_sweep() {
        for ticks in (0..TICKS_WRAP).step_by((TICKS_PER_SECOND / 4) as usize) {
            for delta_cycles in [-500i32, -10, 0, 10, 500] {
                let base = Timestamp::from_ticks(ticks);
                let delta_ticks = delta_cycles as i64 * TICKS_PER_CYCLE as i64;
                let now_ts = add_ticks(base, delta_ticks);
                let ct_now = ticks_to_ct(now_ts);
                let sph = full_ticks_to_sph(base);
                let recovered = sph_recv_to_full_ticks(sph, ct_now);
                assert_eq!(recovered.ticks(), base.ticks(), "ticks={ticks} delta={delta_cycles}");
            }
        }
    }

    #[test]
    fn add_sub_ticks_are_inverse() {
        let a = Timestamp::from_ticks(1000);
        let b = add_ticks(a, 5000);
        assert_eq!(sub_ticks(b, a), 5000);
    }
}
