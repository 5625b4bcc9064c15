// Dissemination framing for committed committee blocks.
//
// Layout: [message type][instruction] [32-byte round random seed] [raw round payload]
// The two prefix bytes are routing metadata; the payload is handed unmodified
// to the receiver's consensus deserializer.

use dsnode_core::BLOCK_HASH_SIZE;
use thiserror::Error;

/// Offset of the message body, past the type and instruction bytes.
pub const BODY_OFFSET: usize = 2;

/// Message class of a block announcement; other classes never reach this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Node = 0x02,
}

/// Instruction of a block announcement within the `Node` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeInstruction {
    DsBlock = 0x01,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message too short: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    #[error("unexpected prefix {0:#04x}{1:02x}")]
    UnexpectedPrefix(u8, u8),
}

/// A parsed block announcement.
#[derive(Debug, PartialEq, Eq)]
pub struct BlockAnnouncement<'a> {
    pub random_seed: [u8; BLOCK_HASH_SIZE],
    pub raw_payload: &'a [u8],
}

/// Frame a committed block's raw round payload for dissemination.
pub fn compose_block_message(random_seed: &[u8; BLOCK_HASH_SIZE], raw_payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(BODY_OFFSET + BLOCK_HASH_SIZE + raw_payload.len());
    message.push(MessageType::Node as u8);
    message.push(NodeInstruction::DsBlock as u8);
    message.extend_from_slice(random_seed);
    message.extend_from_slice(raw_payload);
    message
}

pub fn parse_block_message(message: &[u8]) -> Result<BlockAnnouncement<'_>, MessageError> {
    let min = BODY_OFFSET + BLOCK_HASH_SIZE;
    if message.len() < min {
        return Err(MessageError::Truncated { len: message.len(), min });
    }
    if message[0] != MessageType::Node as u8 || message[1] != NodeInstruction::DsBlock as u8 {
        return Err(MessageError::UnexpectedPrefix(message[0], message[1]));
    }

    let mut random_seed = [0u8; BLOCK_HASH_SIZE];
    random_seed.copy_from_slice(&message[BODY_OFFSET..min]);
    Ok(BlockAnnouncement {
        random_seed,
        raw_payload: &message[min..],
    })
}
