//! Second-order delay-locked loop (C3) estimating ticks-per-frame from
//! observed packet timestamps.
//!
//! The teacher has no rate-estimation code of its own (it trusts the
//! soundcard's own clock and a cpal callback timestamp for latency only),
//! so this is a fresh implementation of the standard second-order DLL
//! FFADO itself uses, following the critically-damped-loop coefficients
//! described in `MotuReceiveStreamProcessor`'s use of a `DelayLockedLoop`
//! helper and the jackd `dll_update` model that codebase descends from.

/// A second-order DLL. `feed` is called once per received data packet
/// carrying a valid timestamp; `ticks_per_frame` is sampled continuously
/// by consumers.
#[derive(Debug, Clone)]
pub struct RateDll {
    nominal_ticks_per_frame: f64,
    bandwidth_hz: f64,
    update_rate_hz: f64,

    b: f64,
    c: f64,

    locked: bool,
    filter_state_1: f64,
    filter_state_2: f64,
    last_timestamp_ticks: Option<i64>,
}

impl RateDll {
    /// `nominal_ticks_per_frame` seeds the loop (e.g. `TICKS_PER_SECOND /
    /// sample_rate`). `bandwidth_hz` is the loop's natural bandwidth
    /// (`streaming.common.{recv,xmit}_sp_dll_bw`, default 0.01 of the
    /// packet rate). `update_rate_hz` is how often `feed` is expected to
    /// be called (the packet rate, typically 8000 / n_events_per_packet).
    pub fn new(nominal_ticks_per_frame: f64, bandwidth_hz: f64, update_rate_hz: f64) -> Self {
        let mut dll = RateDll {
            nominal_ticks_per_frame,
            bandwidth_hz,
            update_rate_hz,
            b: 0.0,
            c: 0.0,
            locked: false,
            filter_state_1: nominal_ticks_per_frame,
            filter_state_2: nominal_ticks_per_frame,
            last_timestamp_ticks: None,
        };
        dll.recompute_coefficients();
        dll
    }

    fn recompute_coefficients(&mut self) {
        // Critically damped second-order loop coefficients, standard form:
        // omega = 2*pi*bandwidth/update_rate; b = sqrt(2)*omega; c = omega^2.
        let omega = 2.0 * std::f64::consts::PI * self.bandwidth_hz / self.update_rate_hz;
        self.b = std::f64::consts::SQRT_2 * omega;
        self.c = omega * omega;
    }

    pub fn reset(&mut self) {
        self.filter_state_1 = self.nominal_ticks_per_frame;
        self.filter_state_2 = self.nominal_ticks_per_frame;
        self.last_timestamp_ticks = None;
        self.locked = false;
    }

    /// Feed one observed packet: `measured_ticks` is the tick timestamp of
    /// this packet (e.g. its SYT or last-event SPH converted to full
    /// ticks), `frames_in_packet` the number of audio frames it carried.
    pub fn feed(&mut self, measured_ticks: i64, frames_in_packet: u32) {
        let Some(last) = self.last_timestamp_ticks else {
            self.last_timestamp_ticks = Some(measured_ticks);
            self.locked = false;
            return;
        };

        let interval = (measured_ticks - last) as f64;
        self.last_timestamp_ticks = Some(measured_ticks);

        if frames_in_packet == 0 {
            return;
        }

        let measured_ticks_per_frame = interval / frames_in_packet as f64;
        let error = measured_ticks_per_frame - self.filter_state_2;

        self.filter_state_2 += self.b * error;
        self.filter_state_1 += self.c * error;
        self.filter_state_2 += self.filter_state_1 / self.update_rate_hz;

        self.locked = true;
    }

    /// Current best estimate of ticks per frame.
    pub fn ticks_per_frame(&self) -> f64 {
        self.filter_state_2
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_to_steady_rate_within_one_second() {
        // 48kHz nominal, 8 frames/packet -> ticks_per_frame = 24_576_000/48000 = 512
        let nominal = 24_576_000.0 / 48000.0;
        let mut dll = RateDll::new(nominal, 100.0, 1000.0);

        let mut ts: i64 = 0;
        let true_tpf = 512.03; // slightly faster clock than nominal
        let frames_per_packet = 8u32;

        for _ in 0..1000 {
            ts += (true_tpf * frames_per_packet as f64).round() as i64;
            dll.feed(ts, frames_per_packet);
        }

        assert!(dll.is_locked());
        let err = (dll.ticks_per_frame() - true_tpf).abs() / true_tpf;
        assert!(err < 0.0005, "relative error too large: {err}");
    }

    #[test]
    fn first_feed_does_not_lock() {
        let mut dll = RateDll::new(512.0, 100.0, 1000.0);
        dll.feed(1000, 8);
        assert!(!dll.is_locked());
        dll.feed(2000, 8);
        assert!(dll.is_locked());
    }

    #[test]
    fn reset_returns_to_nominal() {
        let mut dll = RateDll::new(512.0, 100.0, 1000.0);
        dll.feed(1000, 8);
        dll.feed(5000, 8);
        dll.reset();
        assert_eq!(dll.ticks_per_frame(), 512.0);
        assert!(!dll.is_locked());
    }
}
