pub mod broadcast;
pub mod message;
pub mod peer;

pub use broadcast::{Dispatch, NetworkBroadcast, RecordingBroadcast, ShardWhitelist};
pub use message::{compose_block_message, parse_block_message, BlockAnnouncement, MessageError};
pub use peer::Peer;
