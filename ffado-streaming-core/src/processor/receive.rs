//! Receive-side stream processor: classify an incoming packet, extract
//! its timestamp, decode its events, and push them into the ring buffer.
//!
//! Grounded on `MotuReceiveStreamProcessor::processPacketHeader` /
//! `processPacketData` (validation + SPH extraction) and the teacher's
//! `bark-core::decode::task::Decode` for the general shape of "validate,
//! then decode into a sink, tracking rate" — generalised from software
//! resampling to hardware-timestamp-driven DLL feeding, since this core
//! does not resample.

use std::sync::Arc;

use ffado_streaming_types::cycletimer::{sph_recv_to_full_ticks, CycleTimer, Timestamp};
use ffado_streaming_types::diag::StreamDiagnostics;
use ffado_streaming_types::error::RecvDisposition;
use ffado_streaming_types::packet::{AmdtpQ1, CipQ0, AMDTP_FMT_MBLA, MOTU_FDF};
use ffado_streaming_types::n_events_for_rate;

use crate::codec::midi::MidiFifo;
use crate::dll::RateDll;
use crate::processor::{frame_byte_size, samples_to_bytes, FamilyCodec};
use crate::ring::RingProducer;

pub struct ReceiveProcessor {
    codec: FamilyCodec,
    producer: RingProducer,
    sample_rate: u32,
    enabled: bool,
    last_dbc: Option<u8>,
    diag: Arc<StreamDiagnostics>,
    /// MIDI bytes decoded from the wire, awaiting client pickup. `None`
    /// for AMDTP streams, which carry no MIDI channel in this core.
    midi_in: Option<MidiFifo>,
    scratch_samples: Vec<i32>,
    scratch_bytes: Vec<u8>,
}

impl ReceiveProcessor {
    pub fn new(codec: FamilyCodec, producer: RingProducer, sample_rate: u32, diag: Arc<StreamDiagnostics>) -> Self {
        let channels = codec.channels();
        let midi_in = matches!(codec, FamilyCodec::Motu(_)).then(MidiFifo::new);

        ReceiveProcessor {
            codec,
            producer,
            sample_rate,
            enabled: false,
            last_dbc: None,
            diag,
            midi_in,
            scratch_samples: vec![0i32; channels],
            scratch_bytes: vec![0u8; frame_byte_size(channels)],
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn pop_midi_byte(&mut self) -> Option<u8> {
        self.midi_in.as_mut().and_then(MidiFifo::pop)
    }

    /// Process one received packet. `ct_now` is the 1394 service's cycle
    /// timer reading at the moment of reception, used to recover the full
    /// tick value of a MOTU SPH. `dll`, if this processor is the sync
    /// source, is fed with the packet's timestamp.
    pub fn on_packet(
        &mut self,
        data: &[u8],
        tag: u8,
        ct_now: CycleTimer,
        dll: Option<&mut RateDll>,
    ) -> RecvDisposition {
        if tag != 1 || data.len() < 8 {
            self.diag.record_invalid_packet();
            return RecvDisposition::Invalid;
        }

        let q0 = CipQ0(u32::from_be_bytes(data[0..4].try_into().unwrap()));
        let dbs = q0.dbs();
        let dbc = q0.dbc();

        let (valid, timestamp) = match &self.codec {
            FamilyCodec::Amdtp(_) => {
                let q1 = AmdtpQ1(u32::from_be_bytes(data[4..8].try_into().unwrap()));
                if q1.fmt() != AMDTP_FMT_MBLA || q1.syt() == AmdtpQ1::no_data_syt() {
                    (false, Timestamp::from_ticks(0))
                } else {
                    let syt = q1.syt();
                    let sph_ticks = sph_recv_to_full_ticks(syt as u32, ct_now);
                    (true, sph_ticks)
                }
            }
            FamilyCodec::Motu(codec) => {
                let q1 = u32::from_be_bytes(data[4..8].try_into().unwrap());
                if (q1 >> 16) as u8 != MOTU_FDF || dbs == 0 {
                    (false, Timestamp::from_ticks(0))
                } else {
                    let n_events = n_events_for_rate(self.sample_rate) as usize;
                    let event_size = codec.event_size();
                    let last_event_start = 8 + (n_events - 1) * event_size;
                    if data.len() < last_event_start + event_size {
                        (false, Timestamp::from_ticks(0))
                    } else {
                        let sph = codec.decode_sph(&data[last_event_start..last_event_start + event_size]);
                        (true, sph_recv_to_full_ticks(sph, ct_now))
                    }
                }
            }
        };

        if !valid {
            self.diag.record_invalid_packet();
            return RecvDisposition::Invalid;
        }

        let n_events_u8 = n_events_for_rate(self.sample_rate) as u8;
        let mut dbc_disposition = None;
        if let Some(last_dbc) = self.last_dbc {
            let expected = last_dbc.wrapping_add(n_events_u8);
            if dbc != expected {
                self.diag.record_invalid_packet();

                // Interpret the wrapping u8 delta as signed to tell a
                // back-step (or repeat) apart from a forward skip: a
                // negative or short delta means dbc didn't reach where it
                // should have, a delta bigger than one packet's worth of
                // data blocks means at least one packet was dropped.
                let raw_delta = dbc.wrapping_sub(last_dbc);
                let delta = if raw_delta >= 128 { raw_delta as i32 - 256 } else { raw_delta as i32 };

                dbc_disposition = Some(if delta > n_events_u8 as i32 {
                    self.diag.record_xrun();
                    RecvDisposition::XRun
                } else {
                    RecvDisposition::Invalid
                });
            }
        }
        self.last_dbc = Some(dbc);

        if let Some(disposition) = dbc_disposition {
            return disposition;
        }

        if let Some(dll) = dll {
            dll.feed(timestamp.ticks() as i64, n_events_for_rate(self.sample_rate));
            self.producer.set_ticks_per_frame(dll.ticks_per_frame());
        }

        if !self.enabled {
            return RecvDisposition::Ok;
        }

        let n_events = n_events_for_rate(self.sample_rate) as usize;
        let channels = self.codec.channels();
        let event_size = self.codec.wire_event_size();

        let mut frame_bytes = vec![0u8; n_events * frame_byte_size(channels)];

        for i in 0..n_events {
            let start = 8 + i * event_size;
            if data.len() < start + event_size {
                self.diag.record_invalid_packet();
                return RecvDisposition::Invalid;
            }
            let event = &data[start..start + event_size];

            match &self.codec {
                FamilyCodec::Amdtp(codec) => codec.decode_event(event, &mut self.scratch_samples),
                FamilyCodec::Motu(codec) => {
                    let decoded = codec.decode_event(event, &mut self.scratch_samples);
                    if let (Some(midi_in), Some(byte)) = (self.midi_in.as_mut(), decoded.midi_byte) {
                        midi_in.push(byte, &self.diag);
                    }
                }
            }

            samples_to_bytes(&self.scratch_samples, &mut self.scratch_bytes);
            let out = &mut frame_bytes[i * frame_byte_size(channels)..(i + 1) * frame_byte_size(channels)];
            out.copy_from_slice(&self.scratch_bytes);
        }

        match self.producer.write_frames(n_events, &frame_bytes, timestamp) {
            Ok(()) => {
                if self.producer.write_space_frames() == 0 {
                    RecvDisposition::Defer
                } else {
                    RecvDisposition::Ok
                }
            }
            Err(_) => {
                self.diag.record_xrun();
                RecvDisposition::XRun
            }
        }
    }
}
