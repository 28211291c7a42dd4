pub mod codec;
pub mod dll;
pub mod manager;
pub mod processor;
pub mod ring;

pub use dll::RateDll;
pub use manager::{StreamProcessorManager, SyncSource};
pub use processor::{FamilyCodec, ReceiveProcessor, StreamState, TransmitProcessor};
