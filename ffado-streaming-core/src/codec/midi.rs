//! MOTU MIDI byte FIFO: decouples the client's variable MIDI byte rate
//! from the fixed one-byte-per-N-frames wire rate.
//!
//! Grounded on the teacher's `bark-core::receive::queue::PacketQueue`: a
//! fixed-capacity `heapless::Deque` with drop-oldest-and-warn overflow
//! behaviour, generalised from "queue of whole packets, indexed by
//! sequence number" to "queue of single MIDI bytes, indexed by arrival
//! order" since MOTU multiplexes MIDI one byte per several audio frames.

use heapless::Deque;

use ffado_streaming_types::diag::StreamDiagnostics;

pub const MIDI_FIFO_CAPACITY: usize = 32;

pub struct MidiFifo {
    queue: Deque<u8, MIDI_FIFO_CAPACITY>,
    /// Set once the first overflow has been logged, so a device spraying
    /// MIDI faster than the wire can carry it doesn't spam the log.
    overflow_warned: bool,
}

impl MidiFifo {
    pub fn new() -> Self {
        MidiFifo { queue: Deque::new(), overflow_warned: false }
    }

    /// Push one MIDI byte from the client. On overflow the oldest byte is
    /// dropped to make room, matching the original driver's
    /// `RX_MIDIBUFFER_SIZE` overflow policy, and the event is recorded in
    /// `diag` so the control thread's cumulative tally stays accurate. The
    /// first overflow for this FIFO's lifetime also logs a warning
    /// immediately, rather than waiting for the run's end-of-session tally.
    pub fn push(&mut self, byte: u8, diag: &StreamDiagnostics) {
        if self.queue.is_full() {
            self.queue.pop_front();
            diag.record_midi_overflow();
            if !self.overflow_warned {
                log::warn!("midi fifo overflowed ({MIDI_FIFO_CAPACITY}-byte capacity), dropping oldest byte");
                self.overflow_warned = true;
            }
        }
        // capacity was just guaranteed by the pop_front above if needed
        let _ = self.queue.push_back(byte);
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl Default for MidiFifo {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimum frame spacing between two transmitted MIDI bytes, derived from
/// the 31250 bps (3125 byte/s) MIDI wire rate: `ceil(sample_rate / 3125)`.
pub fn min_frame_spacing(sample_rate: u32) -> u32 {
    (sample_rate + 3124) / 3125
}

/// Tracks frames-since-last-MIDI-byte so the transmit codec can enforce
/// [`min_frame_spacing`].
#[derive(Debug, Default)]
pub struct MidiRateLimiter {
    frames_since_last: u32,
}

impl MidiRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once per encoded event. Returns whether a MIDI byte may be
    /// emitted on this event.
    pub fn tick(&mut self, spacing: u32) -> bool {
        self.frames_since_last += 1;
        if self.frames_since_last >= spacing {
            self.frames_since_last = 0;
            true
        } else {
            false
        }
    }
}
