//! Constants and limits for the relchan wire format

use core::time::Duration;

/// Fixed header size: type (1) + length (4) + index (4) + payload checksum (1) + header checksum (1)
pub const HEADER_LEN: usize = 11;

/// Number of header bytes covered by the header checksum (everything but the checksum itself)
pub const HEADER_BODY_LEN: usize = HEADER_LEN - 1;

/// Offset of the 4-byte length field
pub const LENGTH_OFFSET: usize = 1;

/// Offset of the 4-byte index field
pub const INDEX_OFFSET: usize = 5;

/// Offset of the payload checksum byte
pub const PAYLOAD_CHECKSUM_OFFSET: usize = 9;

/// Offset of the header checksum byte
pub const HEADER_CHECKSUM_OFFSET: usize = 10;

/// Largest payload the format will ever carry (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Wire code for SYN
pub const CODE_SYN: u8 = 1;
/// Wire code for SYNACK
pub const CODE_SYNACK: u8 = 2;
/// Wire code for DAT
pub const CODE_DAT: u8 = 3;
/// Wire code for ACK
pub const CODE_ACK: u8 = 4;
/// Wire code for STP
pub const CODE_STP: u8 = 5;
/// Wire code for FIN
pub const CODE_FIN: u8 = 6;
/// Wire code for FINACK
pub const CODE_FINACK: u8 = 7;

/// Default retransmission interval
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default bound on `connect`/`disconnect`
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default wait for the remainder of a partially received packet
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(1000);

/// Size of the scratch buffer used when pulling bytes from a source
pub const READ_CHUNK: usize = 4096;
