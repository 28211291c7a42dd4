//! Typed port model shared by every device-family codec (C4's data side).
//!
//! Grounded on the teacher's `bark-protocol::types` family-of-plain-structs
//! style, generalised from a single fixed audio layout to a per-device port
//! table since a real FFADO device exposes a variable number of audio, MIDI
//! and control ports.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Transmit,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PortKind {
    Audio,
    Midi,
    Control,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Signalling {
    /// The client is woken once per period; this port's buffer is only
    /// touched from the client thread.
    PeriodSignalled,
    /// The port's buffer may be touched packet-by-packet from the ISO
    /// thread (MIDI, control).
    PacketSignalled,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataType {
    Int24,
    Float32,
}

/// Static description of one port. The buffer itself is owned by the
/// device and is not part of this struct; stream processors borrow it for
/// their lifetime.
#[derive(Debug, Clone)]
pub struct Port {
    name: String,
    direction: Direction,
    kind: PortKind,
    data_type: DataType,
    /// Byte offset of this port's first sample/byte within one wire event.
    position: usize,
    /// Width in bytes within the event (3 for a 24-bit audio sample).
    width: usize,
    /// Slot index of this port within the codec's client-visible
    /// channel-major frame buffer (the decoded-frame sample array a
    /// processor encodes from/decodes into).
    buffer_address: usize,
    buffer_size: usize,
    disabled: bool,
}

impl Port {
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        kind: PortKind,
        data_type: DataType,
        position: usize,
        width: usize,
        buffer_address: usize,
        buffer_size: usize,
    ) -> Self {
        let port = Port {
            name: name.into(),
            direction,
            kind,
            data_type,
            position,
            width,
            buffer_address,
            buffer_size,
            disabled: false,
        };

        // Audio ports are woken once per period; MIDI is touched packet by
        // packet from the ISO thread. Control bytes ride along with MIDI's
        // cadence but carry no client-visible buffer of their own.
        debug_assert!(
            kind != PortKind::Audio || port.signalling() == Signalling::PeriodSignalled,
            "audio ports must be period-signalled",
        );

        port
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn buffer_address(&self) -> usize {
        self.buffer_address
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn signalling(&self) -> Signalling {
        match self.kind {
            PortKind::Audio => Signalling::PeriodSignalled,
            PortKind::Midi | PortKind::Control => Signalling::PacketSignalled,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_ports_are_always_period_signalled() {
        let port = Port::new("in-1", Direction::Receive, PortKind::Audio, DataType::Int24, 7, 3, 0, 64);
        assert_eq!(port.signalling(), Signalling::PeriodSignalled);
    }

    #[test]
    fn midi_ports_are_packet_signalled() {
        let port = Port::new("midi-1", Direction::Transmit, PortKind::Midi, DataType::Int24, 6, 1, 0, 64);
        assert_eq!(port.signalling(), Signalling::PacketSignalled);
    }

    #[test]
    fn disabling_a_port_is_observable() {
        let mut port = Port::new("in-1", Direction::Receive, PortKind::Audio, DataType::Int24, 0, 4, 0, 0);
        assert!(!port.is_disabled());
        port.set_disabled(true);
        assert!(port.is_disabled());
    }
}
