//! Companion configuration sync
//!
//! Zone boundaries and the target zone travel between the authoring device and
//! the companion as discrete string key/value pairs over a [`Transport`].

pub mod channel;
pub mod codec;
pub mod receiver;
pub mod transport;

pub use channel::{ConfigSyncChannel, DeliveryReport, SyncMessage};
pub use codec::{decode_frame, encode_pair};
pub use receiver::{ApplyOutcome, ConfigSyncReceiver};
pub use transport::{MemoryTransport, Transport};
