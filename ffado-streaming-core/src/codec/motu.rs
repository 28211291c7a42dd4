//! MOTU event codec: SPH-prefixed events with raw (unlabelled) 24-bit
//! audio samples, a MIDI byte, and a device-control byte.
//!
//! Grounded directly on `MotuReceiveStreamProcessor::decodeMotuEventsToPort`
//! / `decodeMotuMidiEventsToPort` (sign-extension from three raw bytes,
//! the MIDI-present flag byte, MIDI FIFO overflow-drop-oldest) and
//! `MotuTransmitStreamProcessor::fullTicksToSph` (25-bit SPH masking).
//! Audio channels are driven by a per-channel [`Port`] table exactly as
//! in `codec::amdtp`, laid out starting after the SPH/MIDI/control header
//! bytes.

use ffado_streaming_types::cycletimer::{full_ticks_to_sph, Timestamp};
use ffado_streaming_types::packet::{
    sign_extend_24, MOTU_AUDIO_BASE_OFFSET, MOTU_CONTROL_BYTE_OFFSET, MOTU_MIDI_BYTE_OFFSET,
    MOTU_MIDI_FLAG_OFFSET, MOTU_SPH_LEN, MOTU_SPH_OFFSET,
};
use ffado_streaming_types::port::{DataType, Direction, Port, PortKind};

#[derive(Debug, Clone)]
pub struct MotuCodec {
    ports: Vec<Port>,
}

impl MotuCodec {
    pub fn new(channels: usize, direction: Direction) -> Self {
        let ports = (0..channels)
            .map(|ch| {
                Port::new(
                    format!("audio-{ch}"),
                    direction,
                    PortKind::Audio,
                    DataType::Int24,
                    MOTU_AUDIO_BASE_OFFSET + ch * 3,
                    3,
                    ch,
                    0,
                )
            })
            .collect();

        MotuCodec { ports }
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn channels(&self) -> usize {
        self.ports.len()
    }

    pub fn set_all_disabled(&mut self, disabled: bool) {
        for port in &mut self.ports {
            port.set_disabled(disabled);
        }
    }

    pub fn event_size(&self) -> usize {
        MOTU_AUDIO_BASE_OFFSET + self.channels() * 3
    }

    pub fn decode_sph(&self, event: &[u8]) -> u32 {
        let bytes = &event[MOTU_SPH_OFFSET..MOTU_SPH_OFFSET + MOTU_SPH_LEN];
        u32::from_be_bytes(bytes.try_into().unwrap())
    }

    /// Decode one event's audio channels, its optional MIDI byte, and its
    /// raw (unparsed) device-control byte.
    pub fn decode_event(&self, event: &[u8], samples_out: &mut [i32]) -> DecodedEvent {
        assert_eq!(event.len(), self.event_size());
        assert_eq!(samples_out.len(), self.ports.len());

        for port in &self.ports {
            if port.is_disabled() {
                samples_out[port.buffer_address()] = 0;
                continue;
            }

            let base = port.position();
            let raw = (event[base] as u32) << 16 | (event[base + 1] as u32) << 8 | event[base + 2] as u32;
            samples_out[port.buffer_address()] = sign_extend_24(raw);
        }

        let midi_present = event[MOTU_MIDI_FLAG_OFFSET] != 0;
        let midi_byte = midi_present.then(|| event[MOTU_MIDI_BYTE_OFFSET]);

        DecodedEvent {
            midi_byte,
            control_byte: event[MOTU_CONTROL_BYTE_OFFSET],
        }
    }

    /// Encode one event: SPH, audio samples, an optional MIDI byte. The
    /// control byte is always written as 0x00 (no-command) — this core
    /// does not originate device-control actions. A disabled port writes
    /// silence regardless of `samples_in`'s contents.
    pub fn encode_event(
        &self,
        tick: Timestamp,
        samples_in: &[i32],
        midi_byte: Option<u8>,
        event: &mut [u8],
    ) {
        assert_eq!(event.len(), self.event_size());
        assert_eq!(samples_in.len(), self.ports.len());

        event.fill(0);

        let sph = full_ticks_to_sph(tick);
        event[MOTU_SPH_OFFSET..MOTU_SPH_OFFSET + MOTU_SPH_LEN].copy_from_slice(&sph.to_be_bytes());

        if let Some(byte) = midi_byte {
            event[MOTU_MIDI_FLAG_OFFSET] = 0x01;
            event[MOTU_MIDI_BYTE_OFFSET] = byte;
        }

        // control byte left at 0x00 by the fill() above.

        for port in &self.ports {
            let sample = if port.is_disabled() { 0 } else { samples_in[port.buffer_address()] };
            let base = port.position();
            let bytes = sample.to_be_bytes();
            // sample is sign-extended in a 32-bit container; keep the low
            // 3 bytes, which is what the original raw-byte reassembly
            // expects on decode.
            event[base] = bytes[1];
            event[base + 1] = bytes[2];
            event[base + 2] = bytes[3];
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub midi_byte: Option<u8>,
    /// Read-only observation of the device-control multiplex byte; this
    /// core does not interpret it (out of scope: it does not route
    /// signals between streams).
    pub control_byte: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_audio_samples() {
        let codec = MotuCodec::new(2, Direction::Transmit);
        let samples = vec![12345i32, -6789];

        let mut event = vec![0u8; codec.event_size()];
        codec.encode_event(Timestamp::from_ticks(1000), &samples, None, &mut event);

        let mut decoded = vec![0i32; 2];
        let info = codec.decode_event(&event, &mut decoded);

        assert_eq!(decoded, samples);
        assert_eq!(info.midi_byte, None);
        assert_eq!(info.control_byte, 0);
    }

    #[test]
    fn sph_round_trips_through_event_header() {
        let codec = MotuCodec::new(1, Direction::Transmit);
        let tick = Timestamp::from_ticks(987_654);
        let mut event = vec![0u8; codec.event_size()];
        codec.encode_event(tick, &[0], None, &mut event);

        let sph = codec.decode_sph(&event);
        assert_eq!(sph, full_ticks_to_sph(tick));
    }

    #[test]
    fn midi_byte_round_trips_when_present() {
        let codec = MotuCodec::new(1, Direction::Transmit);
        let mut event = vec![0u8; codec.event_size()];
        codec.encode_event(Timestamp::from_ticks(0), &[0], Some(0x90), &mut event);

        let mut decoded = vec![0i32; 1];
        let info = codec.decode_event(&event, &mut decoded);
        assert_eq!(info.midi_byte, Some(0x90));
    }

    #[test]
    fn disabled_port_is_silent() {
        let mut codec = MotuCodec::new(1, Direction::Transmit);
        codec.set_all_disabled(true);
        let mut event = vec![0u8; codec.event_size()];
        codec.encode_event(Timestamp::from_ticks(0), &[55555], None, &mut event);

        let mut decoded = vec![0i32; 1];
        codec.decode_event(&event, &mut decoded);
        assert_eq!(decoded[0], 0);
    }

    #[test]
    fn negative_samples_sign_extend_correctly() {
        let codec = MotuCodec::new(1, Direction::Transmit);
        let mut event = vec![0u8; codec.event_size()];
        codec.encode_event(Timestamp::from_ticks(0), &[-1], None, &mut event);

        let mut decoded = vec![0i32; 1];
        codec.decode_event(&event, &mut decoded);
        assert_eq!(decoded[0], -1);
    }

    #[test]
    fn ports_are_laid_out_after_header() {
        let codec = MotuCodec::new(2, Direction::Receive);
        let ports = codec.ports();
        assert_eq!(ports[0].position(), MOTU_AUDIO_BASE_OFFSET);
        assert_eq!(ports[1].position(), MOTU_AUDIO_BASE_OFFSET + 3);
        assert_eq!(ports[0].width(), 3);
        assert_eq!(ports[1].buffer_address(), 1);
    }
}
