//! The `Iso1394` port (§6): the abstract boundary the streaming core
//! consumes instead of a concrete 1394 host controller binding.
//!
//! Grounded on the teacher's `bark-device` module boundary: `bark-device`
//! exposes `Sink`/`Source` as the only way `bark-core` touches real audio
//! hardware, with a `cpal::Stream` hidden behind them. Here the
//! equivalent boundary is `Iso1394`: the streaming core never touches a
//! raw 1394 handle directly, only this trait.

use ffado_streaming_types::cycletimer::CycleTimer;
use ffado_streaming_types::error::{RecvDisposition, TransportError, XmitDisposition};

pub type IsoChannel = u8;

/// Registered per-cycle receive callback: `(data, tag, sy, cycle, dropped)
/// -> disposition`.
pub trait ReceiveCallback: FnMut(&[u8], u8, u8, u32, bool) -> RecvDisposition + Send {}
impl<F> ReceiveCallback for F where F: FnMut(&[u8], u8, u8, u32, bool) -> RecvDisposition + Send {}

/// Registered per-cycle transmit callback: `(out, cycle, dropped,
/// max_len) -> (disposition, tag, sy)`. `out` is cleared and filled by
/// the callback; its final length is the packet length.
pub trait TransmitCallback: FnMut(&mut Vec<u8>, u32, bool, usize) -> (XmitDisposition, u8, u8) + Send {}
impl<F> TransmitCallback for F where F: FnMut(&mut Vec<u8>, u32, bool, usize) -> (XmitDisposition, u8, u8) + Send {}

/// The 1394 service boundary consumed by the streaming core (§6).
/// Implementations own ISO channel allocation, DMA, and the bus cycle
/// timer; the core only ever calls through this trait.
pub trait Iso1394: Send {
    fn allocate_iso_channel(&mut self, bandwidth: u32) -> Result<IsoChannel, TransportError>;
    fn free_iso_channel(&mut self, channel: IsoChannel);

    fn register_receive(&mut self, channel: IsoChannel, cb: Box<dyn ReceiveCallback>);
    fn register_transmit(&mut self, channel: IsoChannel, cb: Box<dyn TransmitCallback>);

    fn cycle_timer(&self) -> CycleTimer;
    fn local_node_id(&self) -> u8;

    /// Start pumping registered callbacks. Implementations decide their
    /// own threading model; `LoopbackTransport` below runs a single
    /// simulated-cycle-clock thread.
    fn start(&mut self) -> Result<(), TransportError>;
    fn stop(&mut self);
}
