//! Push channel: decoding, hydration and connection supervision

pub mod channel;
pub mod hydrate;
pub mod messages;

pub use channel::{ChannelEvent, ChannelUpdate, ConnectionState, SyncChannel};
pub use hydrate::Restored;
pub use messages::ChannelMessage;
