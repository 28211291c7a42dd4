//! AMDTP (IEC 61883-6) event codec: one 32-bit labelled quadlet per
//! channel, no per-event timestamp (the packet carries a single SYT in
//! its CIP header instead).
//!
//! Decode/encode is driven entirely by a per-channel [`Port`] table
//! (`position()`/`width()` pick the quadlet out of the wire event,
//! `buffer_address()` picks its slot in the channel-major sample buffer,
//! `is_disabled()` forces silence on the wire without the caller needing
//! to zero its own buffer) per the port/codec layer contract.

use ffado_streaming_types::packet::{amdtp_decode_sample, amdtp_encode_sample};
use ffado_streaming_types::port::{DataType, Direction, Port, PortKind};

#[derive(Debug, Clone)]
pub struct AmdtpCodec {
    ports: Vec<Port>,
}

impl AmdtpCodec {
    /// Build a codec with `channels` audio ports laid out FFADO-style: one
    /// consecutive 32-bit quadlet per channel, starting at the first event
    /// byte. `direction` records which side of the stream this codec
    /// instance serves (a receive processor decodes through `Receive`
    /// ports, a transmit processor encodes through `Transmit` ports).
    pub fn new(channels: usize, direction: Direction) -> Self {
        let ports = (0..channels)
            .map(|ch| {
                Port::new(
                    format!("audio-{ch}"),
                    direction,
                    PortKind::Audio,
                    DataType::Int24,
                    ch * 4,
                    4,
                    ch,
                    0,
                )
            })
            .collect();

        AmdtpCodec { ports }
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn channels(&self) -> usize {
        self.ports.len()
    }

    pub fn event_size(&self) -> usize {
        self.ports.len() * 4
    }

    /// Force every port disabled (or re-enable them), matching
    /// `TransmitProcessor`'s silent-mode gate.
    pub fn set_all_disabled(&mut self, disabled: bool) {
        for port in &mut self.ports {
            port.set_disabled(disabled);
        }
    }

    /// Decode one event (`event_size()` bytes) into `samples_out`
    /// (`channels` signed 24-bit-range values, indexed by
    /// `port.buffer_address()`).
    pub fn decode_event(&self, event: &[u8], samples_out: &mut [i32]) {
        assert_eq!(event.len(), self.event_size());
        assert_eq!(samples_out.len(), self.ports.len());

        for port in &self.ports {
            if port.is_disabled() {
                samples_out[port.buffer_address()] = 0;
                continue;
            }

            let bytes = &event[port.position()..port.position() + port.width()];
            let quadlet = u32::from_be_bytes(bytes.try_into().unwrap());
            samples_out[port.buffer_address()] = amdtp_decode_sample(quadlet);
        }
    }

    /// Encode `samples_in` into one event. A disabled port writes silence
    /// to the wire regardless of `samples_in`'s contents.
    pub fn encode_event(&self, samples_in: &[i32], event: &mut [u8]) {
        assert_eq!(event.len(), self.event_size());
        assert_eq!(samples_in.len(), self.ports.len());

        for port in &self.ports {
            let sample = if port.is_disabled() { 0 } else { samples_in[port.buffer_address()] };
            let quadlet = amdtp_encode_sample(sample);
            event[port.position()..port.position() + port.width()].copy_from_slice(&quadlet.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_samples_through_wire_event() {
        let codec = AmdtpCodec::new(2, Direction::Transmit);
        let samples = vec![123i32, -456];

        let mut event = vec![0u8; codec.event_size()];
        codec.encode_event(&samples, &mut event);

        let mut decoded = vec![0i32; 2];
        codec.decode_event(&event, &mut decoded);

        assert_eq!(decoded, samples);
    }

    #[test]
    fn disabled_port_is_silent_on_wire() {
        let mut codec = AmdtpCodec::new(1, Direction::Transmit);
        codec.set_all_disabled(true);
        let samples = vec![999i32];

        let mut event = vec![0u8; codec.event_size()];
        codec.encode_event(&samples, &mut event);

        let mut decoded = vec![0i32; 1];
        codec.decode_event(&event, &mut decoded);
        assert_eq!(decoded[0], 0);
    }

    #[test]
    fn label_byte_is_mbla() {
        let codec = AmdtpCodec::new(1, Direction::Transmit);
        let mut event = vec![0u8; codec.event_size()];
        codec.encode_event(&[42], &mut event);
        assert_eq!(event[0], 0x40);
    }

    #[test]
    fn ports_expose_position_and_buffer_address() {
        let codec = AmdtpCodec::new(3, Direction::Receive);
        let ports = codec.ports();
        assert_eq!(ports.len(), 3);
        for (ch, port) in ports.iter().enumerate() {
            assert_eq!(port.position(), ch * 4);
            assert_eq!(port.width(), 4);
            assert_eq!(port.buffer_address(), ch);
            assert_eq!(port.direction(), Direction::Receive);
        }
    }
}
