//! Error types for relchan operations

use thiserror::Error;

/// Errors that can occur while encoding or decoding packets
///
/// Everything except [`PacketError::Incomplete`] and [`PacketError::InvalidStructure`]
/// means the bytes under the decoder are corrupt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The first header byte is not a known packet type
    #[error("Unknown packet type code: {0:#04x}")]
    UnknownType(u8),

    /// Header checksum mismatch
    #[error("Header checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    HeaderChecksum {
        /// The checksum carried in the header.
        expected: u8,
        /// The checksum computed over the received header.
        actual: u8,
    },

    /// Payload checksum mismatch
    #[error("Payload checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    PayloadChecksum {
        /// The checksum carried in the header.
        expected: u8,
        /// The checksum computed over the received payload.
        actual: u8,
    },

    /// Payload length exceeds the configured maximum
    #[error("Payload size {0} exceeds maximum {1}")]
    PayloadTooLarge(u32, u32),

    /// Not enough bytes to finish the packet
    #[error("Incomplete packet: expected {expected} bytes, got {actual}")]
    Incomplete {
        /// The number of bytes expected.
        expected: usize,
        /// The number of bytes actually available.
        actual: usize,
    },

    /// Packet fields disagree with each other
    #[error("Invalid packet structure: {0}")]
    InvalidStructure(String),

    /// IO error while pulling bytes from the medium
    #[error("IO error: {0}")]
    Io(String),
}

impl PacketError {
    /// Whether this error means the buffered bytes cannot start a valid packet
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            PacketError::UnknownType(_)
                | PacketError::HeaderChecksum { .. }
                | PacketError::PayloadChecksum { .. }
                | PacketError::PayloadTooLarge(..)
        )
    }
}

impl From<std::io::Error> for PacketError {
    fn from(err: std::io::Error) -> Self {
        PacketError::Io(err.to_string())
    }
}

/// Errors raised while building or running a channel
///
/// Protocol-level trouble never shows up here; callers of `connect`, `send`
/// and friends only see booleans and [`crate::channel::ReliableChannel::is_valid`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Configuration rejected by [`crate::config::ChannelConfig::validate`]
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine thread could not be spawned
    #[error("Failed to spawn engine thread: {0}")]
    Spawn(String),

    /// `start` was called twice
    #[error("Channel engine already started")]
    AlreadyStarted,

    /// The engine thread panicked
    #[error("Channel engine panicked")]
    EnginePanicked,
}
