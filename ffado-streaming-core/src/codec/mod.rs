//! Port/codec layer (C4): per-device-family encode/decode of one wire
//! event to/from port sample buffers.
//!
//! Grounded on the teacher's `bark-core::decode`/`encode` module split
//! (one submodule per wire format, dispatched through a small enum rather
//! than a trait object, matching `decode::DecodeFormat`/`encode::Encode`),
//! generalised from "one network audio codec" to "one 1394 device-family
//! codec" and from sample-rate conversion (irrelevant here — the core
//! does not resample) to big-endian 24-bit bus sample packing.

pub mod amdtp;
pub mod midi;
pub mod motu;

pub use amdtp::AmdtpCodec;
pub use midi::MidiFifo;
pub use motu::MotuCodec;

/// One decoded or to-be-encoded audio frame, channel-major, 24-bit range
/// sign-extended into an `i32`.
pub type AudioFrame = Vec<i32>;
