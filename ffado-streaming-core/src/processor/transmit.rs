//! Transmit-side stream processor: pull events from the ring buffer,
//! stamp them, and build outgoing packets within the presentation window.
//!
//! Grounded directly on `MotuTransmitStreamProcessor::generatePacketHeader`:
//! the same three-window scheduling (too early -> no-data packet, in
//! window -> data packet, late but still reachable -> data packet, past
//! deadline -> XRun) and the same DBC-holds-on-no-data-packet rule except
//! for the documented 828 MkI quirk (see DESIGN.md).

use std::sync::Arc;

use ffado_streaming_types::cycletimer::{diff_cycles, ticks_to_ct, Timestamp};
use ffado_streaming_types::diag::StreamDiagnostics;
use ffado_streaming_types::error::XmitDisposition;
use ffado_streaming_types::n_events_for_rate;
use ffado_streaming_types::packet::{CipQ0, AmdtpQ1, AMDTP_FMT_MBLA, MOTU_Q1};

use crate::codec::midi::{min_frame_spacing, MidiFifo, MidiRateLimiter};
use crate::processor::{bytes_to_samples, frame_byte_size, FamilyCodec};
use crate::ring::RingConsumer;

/// Default transmit scheduling constants, matching
/// `streaming.amdtp.xmit_*` in the configuration surface.
#[derive(Debug, Copy, Clone)]
pub struct XmitWindow {
    pub max_cycles_early: u32,
    pub transfer_delay_ticks: u32,
    pub min_cycles_before_presentation: u32,
}

impl Default for XmitWindow {
    fn default() -> Self {
        XmitWindow {
            max_cycles_early: 2,
            transfer_delay_ticks: 11 * ffado_streaming_types::TICKS_PER_CYCLE,
            min_cycles_before_presentation: 1,
        }
    }
}

/// Whether the 828 MkI quirk applies: that model advances DBC even on
/// no-data packets, where every later model holds it. See Open Questions
/// in SPEC_FULL.md.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MotuModelQuirk {
    HoldDbcOnNoData,
    AdvanceDbcOnNoData,
}

pub struct TransmitProcessor {
    codec: FamilyCodec,
    consumer: RingConsumer,
    sample_rate: u32,
    sid: u8,
    dbc: u8,
    window: XmitWindow,
    motu_quirk: MotuModelQuirk,
    silent: bool,
    diag: Arc<StreamDiagnostics>,
    midi_out: Option<MidiFifo>,
    midi_limiter: MidiRateLimiter,
    scratch_samples: Vec<i32>,
}

impl TransmitProcessor {
    pub fn new(codec: FamilyCodec, consumer: RingConsumer, sample_rate: u32, sid: u8, diag: Arc<StreamDiagnostics>) -> Self {
        let channels = codec.channels();
        let midi_out = matches!(codec, FamilyCodec::Motu(_)).then(MidiFifo::new);

        TransmitProcessor {
            codec,
            consumer,
            sample_rate,
            sid,
            dbc: 0,
            window: XmitWindow::default(),
            motu_quirk: MotuModelQuirk::HoldDbcOnNoData,
            silent: true,
            diag,
            midi_out,
            midi_limiter: MidiRateLimiter::new(),
            scratch_samples: vec![0i32; channels],
        }
    }

    pub fn set_window(&mut self, window: XmitWindow) {
        self.window = window;
    }

    pub fn set_motu_quirk(&mut self, quirk: MotuModelQuirk) {
        self.motu_quirk = quirk;
    }

    pub fn channels(&self) -> usize {
        self.codec.channels()
    }

    /// While `silent`, outgoing data packets carry zeroed audio (used
    /// during `WaitingForStreamEnable` to keep the device's clock stable
    /// before the client starts writing). Forwarded straight to the
    /// codec's ports so every channel's `is_disabled()` gate flips
    /// together.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
        self.codec.set_all_disabled(silent);
    }

    pub fn push_midi_byte(&mut self, byte: u8) {
        if let Some(midi_out) = self.midi_out.as_mut() {
            midi_out.push(byte, &self.diag);
        }
    }

    /// Build one outgoing packet for the given bus `cycle` (0..ring of
    /// `CYCLES_PER_SECOND * SECONDS_WRAP`). `out` must be at least large
    /// enough for the header plus one packet's worth of events; on
    /// `Packet`/`EmptyPacket` its used length is returned.
    pub fn build_packet(&mut self, cycle: u32, ct_now_ticks: Timestamp, out: &mut Vec<u8>) -> XmitDisposition {
        let n_events = n_events_for_rate(self.sample_rate) as usize;
        let event_size = self.codec.wire_event_size();

        let Some((presentation_ts, fill)) = self.consumer.get_buffer_head_timestamp() else {
            return self.emit_no_data(cycle, out);
        };

        let presentation_cycles = (ticks_to_ct(presentation_ts).cycles) as u32
            + ticks_to_ct(presentation_ts).seconds as u32 * ffado_streaming_types::CYCLES_PER_SECOND;
        let now_cycles = cycle;

        let early_bound_ticks = self.window.transfer_delay_ticks as i64
            + (self.window.max_cycles_early as i64 * ffado_streaming_types::TICKS_PER_CYCLE as i64);
        let late_bound_ticks = self.window.min_cycles_before_presentation as i64
            * ffado_streaming_types::TICKS_PER_CYCLE as i64;

        let cycles_until_presentation = diff_cycles(presentation_cycles, now_cycles) as i64;
        let ticks_until_presentation = cycles_until_presentation * ffado_streaming_types::TICKS_PER_CYCLE as i64;

        if ticks_until_presentation > early_bound_ticks {
            // too early: sit out this cycle
            return self.emit_no_data(cycle, out);
        }

        if ticks_until_presentation < -late_bound_ticks {
            // deadline has passed: xrun
            self.diag.record_xrun();
            return XmitDisposition::XRun;
        }

        if fill < n_events {
            // in-window but buffer underfull: retry, don't advance state
            return XmitDisposition::Again;
        }

        self.emit_data(n_events, event_size, ct_now_ticks, out)
    }

    fn emit_no_data(&mut self, _cycle: u32, out: &mut Vec<u8>) -> XmitDisposition {
        out.clear();

        let advance = matches!(self.motu_quirk, MotuModelQuirk::AdvanceDbcOnNoData)
            && matches!(self.codec, FamilyCodec::Motu(_));

        let q0 = CipQ0::new(self.sid, 0, self.dbc);
        out.extend_from_slice(&q0.0.to_be_bytes());

        match &self.codec {
            FamilyCodec::Amdtp(_) => {
                let q1 = AmdtpQ1::new(AMDTP_FMT_MBLA, 0x00, AmdtpQ1::no_data_syt());
                out.extend_from_slice(&q1.0.to_be_bytes());
            }
            FamilyCodec::Motu(_) => {
                out.extend_from_slice(&MOTU_Q1.to_be_bytes());
            }
        }

        if advance {
            self.dbc = self.dbc.wrapping_add(n_events_for_rate(self.sample_rate) as u8);
        }

        XmitDisposition::EmptyPacket
    }

    fn emit_data(&mut self, n_events: usize, event_size: usize, ct_now_ticks: Timestamp, out: &mut Vec<u8>) -> XmitDisposition {
        out.clear();

        let channels = self.codec.channels();
        let dbs = match &self.codec {
            FamilyCodec::Amdtp(_) => (channels * 4 / 4) as u8, // one quadlet per channel
            FamilyCodec::Motu(_) => ((event_size + 3) / 4) as u8,
        };

        let q0 = CipQ0::new(self.sid, dbs, self.dbc);
        out.extend_from_slice(&q0.0.to_be_bytes());

        match &self.codec {
            FamilyCodec::Amdtp(_) => {
                let syt = ffado_streaming_types::cycletimer::full_ticks_to_sph(ct_now_ticks) as u16;
                let q1 = AmdtpQ1::new(AMDTP_FMT_MBLA, 0x00, syt);
                out.extend_from_slice(&q1.0.to_be_bytes());
            }
            FamilyCodec::Motu(_) => {
                out.extend_from_slice(&MOTU_Q1.to_be_bytes());
            }
        }

        let spacing = min_frame_spacing(self.sample_rate);

        let mut frame_bytes = vec![0u8; frame_byte_size(channels)];

        for _ in 0..n_events {
            if self.consumer.read_frames(1, &mut frame_bytes).is_err() {
                self.diag.record_xrun();
                return XmitDisposition::XRun;
            }
            bytes_to_samples(&frame_bytes, &mut self.scratch_samples);

            let mut event = vec![0u8; event_size];
            match &self.codec {
                FamilyCodec::Amdtp(codec) => {
                    codec.encode_event(&self.scratch_samples, &mut event);
                }
                FamilyCodec::Motu(codec) => {
                    let midi_byte = if self.midi_limiter.tick(spacing) {
                        self.midi_out.as_mut().and_then(MidiFifo::pop)
                    } else {
                        None
                    };
                    codec.encode_event(ct_now_ticks, &self.scratch_samples, midi_byte, &mut event);
                }
            }
            out.extend_from_slice(&event);
        }

        self.dbc = self.dbc.wrapping_add(n_events as u8);

        XmitDisposition::Packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AmdtpCodec;
    use ffado_streaming_types::port::Direction;
    use crate::ring;
    use ffado_streaming_types::cycletimer::CycleTimer;

    /// Fill the ring with `n_events` silent frames such that the *head*
    /// timestamp (the one `build_packet` schedules against) lands exactly
    /// on `head_ts`, given the ring's nominal 512 ticks/frame rate.
    fn fill_ring(producer: &mut crate::ring::RingProducer, n_events: usize, channels: usize, head_ts: Timestamp) {
        let samples = vec![0i32; channels * n_events];
        let mut bytes = vec![0u8; samples.len() * 4];
        crate::processor::samples_to_bytes(&samples, &mut bytes);
        let tail_ts = ffado_streaming_types::cycletimer::add_ticks(head_ts, (n_events as i64 - 1) * 512);
        producer.write_frames(n_events, &bytes, tail_ts).unwrap();
    }

    #[test]
    fn empty_buffer_emits_no_data_packet() {
        let channels = 2;
        let codec = FamilyCodec::Amdtp(AmdtpCodec::new(channels, Direction::Transmit));
        let (_producer, consumer) = ring::new(32, frame_byte_size(channels), 512.0);
        let diag = Arc::new(StreamDiagnostics::new());
        let mut xmit = TransmitProcessor::new(codec, consumer, 48000, 1, diag);

        let mut out = Vec::new();
        let disposition = xmit.build_packet(0, Timestamp::from_ticks(0), &mut out);
        assert_eq!(disposition, XmitDisposition::EmptyPacket);
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn full_buffer_with_presentation_far_in_future_is_too_early() {
        let channels = 2;
        let codec = FamilyCodec::Amdtp(AmdtpCodec::new(channels, Direction::Transmit));
        let (mut producer, consumer) = ring::new(32, frame_byte_size(channels), 512.0);
        let diag = Arc::new(StreamDiagnostics::new());

        // presentation 20 cycles in the future from cycle 0.
        let presentation = CycleTimer::new(0, 20, 0);
        let presentation_ts = ffado_streaming_types::cycletimer::ct_to_ticks(presentation);
        fill_ring(&mut producer, 8, channels, presentation_ts);

        let mut xmit = TransmitProcessor::new(codec, consumer, 48000, 1, diag);
        let mut out = Vec::new();
        let disposition = xmit.build_packet(0, Timestamp::from_ticks(0), &mut out);
        assert_eq!(disposition, XmitDisposition::EmptyPacket);
    }

    #[test]
    fn full_buffer_with_presentation_in_window_emits_data_and_advances_dbc() {
        let channels = 2;
        let codec = FamilyCodec::Amdtp(AmdtpCodec::new(channels, Direction::Transmit));
        let (mut producer, consumer) = ring::new(32, frame_byte_size(channels), 512.0);
        let diag = Arc::new(StreamDiagnostics::new());

        // presentation 9 cycles in the future: within [transfer_delay(11) -
        // max_early(2), min_before(1)] => window roughly covers 9 cycles out.
        let presentation = CycleTimer::new(0, 9, 0);
        let presentation_ts = ffado_streaming_types::cycletimer::ct_to_ticks(presentation);
        fill_ring(&mut producer, 8, channels, presentation_ts);

        let mut xmit = TransmitProcessor::new(codec, consumer, 48000, 1, diag);
        let before_dbc = xmit.dbc;
        let mut out = Vec::new();
        let disposition = xmit.build_packet(0, Timestamp::from_ticks(0), &mut out);
        assert_eq!(disposition, XmitDisposition::Packet);
        assert_eq!(xmit.dbc, before_dbc.wrapping_add(8));
        assert!(out.len() > 8);
    }

    #[test]
    fn deadline_passed_is_xrun() {
        let channels = 2;
        let codec = FamilyCodec::Amdtp(AmdtpCodec::new(channels, Direction::Transmit));
        let (mut producer, consumer) = ring::new(32, frame_byte_size(channels), 512.0);
        let diag = Arc::new(StreamDiagnostics::new());

        // presentation was 5 cycles in the past.
        let presentation = CycleTimer::new(0, 0, 0);
        let presentation_ts = ffado_streaming_types::cycletimer::ct_to_ticks(presentation);
        fill_ring(&mut producer, 8, channels, presentation_ts);

        let mut xmit = TransmitProcessor::new(codec, consumer, 48000, 1, diag);
        let mut out = Vec::new();
        let disposition = xmit.build_packet(5, Timestamp::from_ticks(0), &mut out);
        assert_eq!(disposition, XmitDisposition::XRun);
    }
}
