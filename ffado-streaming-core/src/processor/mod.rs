//! Stream processor (C5): per-stream packet classification, timestamping,
//! and the lifecycle state machine shared by receive and transmit sides.

pub mod receive;
pub mod transmit;

pub use receive::ReceiveProcessor;
pub use transmit::TransmitProcessor;

use crate::codec::{AmdtpCodec, MotuCodec};

/// Which device-family codec a processor uses. Dispatched through a
/// closed enum rather than a trait object, matching the teacher's
/// `decode::DecodeFormat` dispatch style — the set of device families is
/// fixed and known at compile time, so there is no need for dynamic
/// dispatch in the per-event hot path.
#[derive(Debug, Clone)]
pub enum FamilyCodec {
    Amdtp(AmdtpCodec),
    Motu(MotuCodec),
}

impl FamilyCodec {
    pub fn channels(&self) -> usize {
        match self {
            FamilyCodec::Amdtp(c) => c.channels(),
            FamilyCodec::Motu(c) => c.channels(),
        }
    }

    pub fn wire_event_size(&self) -> usize {
        match self {
            FamilyCodec::Amdtp(c) => c.event_size(),
            FamilyCodec::Motu(c) => c.event_size(),
        }
    }

    /// Disable (or re-enable) every port this codec owns, gating its
    /// encode path to silence regardless of what the caller writes into
    /// the transmit ring.
    pub fn set_all_disabled(&mut self, disabled: bool) {
        match self {
            FamilyCodec::Amdtp(c) => c.set_all_disabled(disabled),
            FamilyCodec::Motu(c) => c.set_all_disabled(disabled),
        }
    }
}

/// Stream-processor lifecycle, driven by [`crate::manager::StreamProcessorManager`]
/// at period boundaries so sibling streams move in lockstep.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Initialised,
    Prepared,
    DryRunning,
    WaitingForStreamEnable,
    Running,
    WaitingForStreamDisable,
    Stopping,
    Stopped,
}

/// Decoded/to-be-encoded frame storage: channel-major `i32` samples, one
/// slot per (event, channel) pair, independent of any wire format. This is
/// the byte layout stored in the ring buffer — decode/encode only happens
/// at the ring buffer's boundary with the wire.
pub fn frame_byte_size(channels: usize) -> usize {
    channels * 4
}

pub fn samples_to_bytes(samples: &[i32], out: &mut [u8]) {
    assert_eq!(out.len(), samples.len() * 4);
    for (i, sample) in samples.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&sample.to_le_bytes());
    }
}

pub fn bytes_to_samples(bytes: &[u8], out: &mut [i32]) {
    assert_eq!(bytes.len(), out.len() * 4);
    for (i, sample) in out.iter_mut().enumerate() {
        *sample = i32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
    }
}
