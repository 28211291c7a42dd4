//! Error vocabulary split across the real-time and client paths, per the
//! teacher's split between `derive_more::From` tuple-wrapping enums (used
//! where no `Display` message is needed) and `thiserror::Error` enums
//! (used where one is). The real-time path never returns an allocating
//! error type at all: it returns one of the `Copy` disposition enums
//! below by value.

use thiserror::Error;

/// Outcome of a receive-side ISO callback. Returned by value, never
/// allocates, never implements `std::error::Error` — this is not a
/// "failure" channel in the usual sense, it's a scheduling signal back to
/// the 1394 service.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecvDisposition {
    /// Packet accepted (or harmlessly ignored because the stream is
    /// disabled) and processed.
    Ok,
    /// Packet failed validation; it contributed nothing but counts as bus
    /// traffic for sync purposes.
    Invalid,
    /// The ring buffer could not accept the decoded frames.
    XRun,
    /// At least one period is now available; the transport should stop
    /// polling this stream and let the client run.
    Defer,
}

/// Outcome of a transmit-side ISO callback.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XmitDisposition {
    /// A data-carrying packet was written into the caller's buffer.
    Packet,
    /// A CIP-header-only "no data" packet was written.
    EmptyPacket,
    /// Too early to transmit; try again next cycle without advancing
    /// state.
    Again,
    /// The ring buffer underran the presentation deadline.
    XRun,
}

/// Client-path ring buffer errors.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("ring buffer overrun: {requested} frames requested, {available} available to write")]
    Overrun { requested: usize, available: usize },

    #[error("ring buffer underrun: {requested} frames requested, {available} available to read")]
    Underrun { requested: usize, available: usize },
}

/// Errors from the stream-processor manager's lifecycle state machine.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("timed out waiting to reach {state} (after {elapsed_cycles} cycles)")]
    LifecycleTimeout { state: &'static str, elapsed_cycles: u32 },

    #[error("sync source lost lock")]
    SyncLost,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("ring buffer error: {0}")]
    RingBuffer(#[from] RingBufferError),
}

/// Errors surfaced by the `Iso1394` transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to allocate isochronous channel: {0}")]
    ChannelAllocation(String),

    #[error("isochronous transport is not running")]
    NotRunning,
}

/// Configuration loading/parsing errors, composed with `#[from]` the way
/// the teacher's `OpenError`/`NewDecoderError` wrap lower-level errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, #[source] source: toml::de::Error },
}
