pub mod iso;
pub mod loopback;

pub use iso::{Iso1394, IsoChannel, ReceiveCallback, TransmitCallback};
pub use loopback::LoopbackTransport;
