//! # Relchan Core
//!
//! A reliable, message-oriented channel over a noisy byte medium.
//!
//! ## Modules
//!
//! - `constants`: Wire format constants and default timings
//! - `types`: Core types (Packet, PacketHeader, WireFormat)
//! - `encoder`: Packet encoding
//! - `decoder`: Strict and streaming packet decoding
//! - `scanner`: Resynchronization over damaged input
//! - `state`: Connection state machine
//! - `channel`: Thread-safe public API
//! - `medium`, `pipe`: Byte media, including in-memory pipes with fault injection

#![warn(missing_docs)]

pub mod channel;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod encoder;
mod engine;
pub mod error;
pub mod medium;
pub mod pipe;
pub mod queue;
pub mod reader;
pub mod scanner;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use channel::ReliableChannel;
pub use config::ChannelConfig;
pub use error::{ChannelError, PacketError};
pub use medium::{ByteSource, Interrupt};
pub use state::State;
pub use types::{ChecksumMode, Endianness, Packet, PacketHeader, PacketType, WireFormat};

/// Result type alias for packet operations
pub type Result<T> = core::result::Result<T, PacketError>;
