//! Non-real-time diagnostics counters, surfaced by the control thread on
//! behalf of the ISO thread (§4.7 of the streaming design). The ISO thread
//! only ever increments these via relaxed atomics; it never logs directly.
//!
//! Grounded on the teacher's `bark-protocol::types::stats::receiver`
//! pattern of a flags-gated set of optional diagnostic fields, adapted
//! from "optional f64 fields gated by bitflags" to "counters gated by
//! whether they have ever been touched", since here the consumer is a log
//! line rather than a wire reply packet.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StreamDiagnostics {
    pub invalid_packets: AtomicU64,
    pub xruns: AtomicU64,
    pub dll_unlock_events: AtomicU64,
    pub midi_overflows: AtomicU64,
}

impl StreamDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_invalid_packet(&self) {
        self.invalid_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dll_unlock(&self) {
        self.dll_unlock_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_midi_overflow(&self) {
        self.midi_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            xruns: self.xruns.load(Ordering::Relaxed),
            dll_unlock_events: self.dll_unlock_events.load(Ordering::Relaxed),
            midi_overflows: self.midi_overflows.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticsSnapshot {
    pub invalid_packets: u64,
    pub xruns: u64,
    pub dll_unlock_events: u64,
    pub midi_overflows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let diag = StreamDiagnostics::new();
        assert_eq!(diag.snapshot(), DiagnosticsSnapshot::default());

        diag.record_xrun();
        diag.record_xrun();
        diag.record_midi_overflow();

        let snap = diag.snapshot();
        assert_eq!(snap.xruns, 2);
        assert_eq!(snap.midi_overflows, 1);
        assert_eq!(snap.invalid_packets, 0);
    }
}
