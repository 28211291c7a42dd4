//! Wire-exact CIP header layouts for AMDTP and MOTU packets.
//!
//! Grounded on the teacher's `bark-protocol::types` use of `bytemuck::Pod`
//! structs for bit-exact network layouts; generalised from the teacher's
//! little-endian float packets to the big-endian bitfield quadlets the
//! 1394 CIP header actually uses, so the struct fields are accessed through
//! explicit bit-packing methods rather than relied on for byte layout.

use bytemuck::{Pod, Zeroable};

/// First CIP quadlet, common to AMDTP and MOTU: source id, data-block size,
/// data-block counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Zeroable, Pod)]
#[repr(transparent)]
pub struct CipQ0(pub u32);

impl CipQ0 {
    pub fn new(sid: u8, dbs: u8, dbc: u8) -> Self {
        CipQ0(((sid as u32 & 0x3f) << 24) | ((dbs as u32) << 16) | (dbc as u32))
    }

    pub fn sid(self) -> u8 {
        ((self.0 >> 24) & 0x3f) as u8
    }

    pub fn dbs(self) -> u8 {
        ((self.0 >> 16) & 0xff) as u8
    }

    pub fn dbc(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    pub fn with_dbc(self, dbc: u8) -> Self {
        CipQ0((self.0 & !0xff) | dbc as u32)
    }
}

/// Second CIP quadlet for AMDTP: format, format-dependent-field, SYT.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Zeroable, Pod)]
#[repr(transparent)]
pub struct AmdtpQ1(pub u32);

pub const AMDTP_FMT_MBLA: u8 = 0x10;

impl AmdtpQ1 {
    pub fn new(fmt: u8, fdf: u8, syt: u16) -> Self {
        AmdtpQ1(((fmt as u32) << 24) | ((fdf as u32) << 16) | syt as u32)
    }

    pub fn fmt(self) -> u8 {
        ((self.0 >> 24) & 0x3f) as u8
    }

    pub fn fdf(self) -> u8 {
        ((self.0 >> 16) & 0xff) as u8
    }

    pub fn syt(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    pub fn no_data_syt() -> u16 {
        0xffff
    }
}

/// Second CIP quadlet for MOTU: constant aside from the SID byte the 1394
/// link layer inserts, per the family's fixed FDF=0x22 framing.
pub const MOTU_Q1: u32 = 0x8222_ffff;
pub const MOTU_FDF: u8 = 0x22;

/// One AMDTP MBLA audio sample occupies a 32-bit quadlet: an 8-bit label
/// (0x40 for MBLA) followed by a 24-bit signed sample.
pub const AMDTP_MBLA_LABEL: u8 = 0x40;

pub fn amdtp_encode_sample(sample_24: i32) -> u32 {
    ((AMDTP_MBLA_LABEL as u32) << 24) | (sample_24 as u32 & 0x00ff_ffff)
}

pub fn amdtp_decode_sample(quadlet: u32) -> i32 {
    sign_extend_24(quadlet & 0x00ff_ffff)
}

/// Sign-extend a 24-bit two's complement value packed in the low bits of a
/// u32, matching `decodeMotuEventsToPort`'s raw-byte reassembly.
pub fn sign_extend_24(value: u32) -> i32 {
    let shifted = (value << 8) as i32;
    shifted >> 8
}

/// Byte offset of the 4-byte Source Packet Header within a MOTU event; it
/// is always the first field.
pub const MOTU_SPH_OFFSET: usize = 0;
pub const MOTU_SPH_LEN: usize = 4;
/// Byte carrying the MIDI-byte-present flag.
pub const MOTU_MIDI_FLAG_OFFSET: usize = 4;
/// Byte carrying the device-control multiplex key (read-only to this core,
/// see `ffado_streaming_core::codec::motu`).
pub const MOTU_CONTROL_BYTE_OFFSET: usize = 5;
/// Byte carrying the MIDI data byte itself, when present.
pub const MOTU_MIDI_BYTE_OFFSET: usize = 6;
/// Offset of the first audio channel's first byte within a MOTU event.
pub const MOTU_AUDIO_BASE_OFFSET: usize = 7;
