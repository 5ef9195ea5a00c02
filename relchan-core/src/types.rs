//! Core types for relchan packets

use crate::constants::{
    CODE_ACK, CODE_DAT, CODE_FIN, CODE_FINACK, CODE_STP, CODE_SYN, CODE_SYNACK, HEADER_BODY_LEN,
    HEADER_LEN, MAX_PAYLOAD_SIZE,
};
use crate::error::PacketError;
use bytes::Bytes;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Packet type carried in the first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Open request
    Syn,
    /// Open acknowledgement
    SynAck,
    /// Application data
    Dat,
    /// Data acknowledgement; carries the index of the acknowledged DAT
    Ack,
    /// Stop request: the sender wants to tear down once its data drains
    Stp,
    /// Close request
    Fin,
    /// Close acknowledgement
    FinAck,
}

impl PacketType {
    /// All packet types in wire-code order
    pub const ALL: [PacketType; 7] = [
        PacketType::Syn,
        PacketType::SynAck,
        PacketType::Dat,
        PacketType::Ack,
        PacketType::Stp,
        PacketType::Fin,
        PacketType::FinAck,
    ];

    /// Wire code of this type
    pub const fn code(self) -> u8 {
        match self {
            PacketType::Syn => CODE_SYN,
            PacketType::SynAck => CODE_SYNACK,
            PacketType::Dat => CODE_DAT,
            PacketType::Ack => CODE_ACK,
            PacketType::Stp => CODE_STP,
            PacketType::Fin => CODE_FIN,
            PacketType::FinAck => CODE_FINACK,
        }
    }

    /// Look up a type by wire code
    pub const fn from_code(code: u8) -> Option<PacketType> {
        match code {
            CODE_SYN => Some(PacketType::Syn),
            CODE_SYNACK => Some(PacketType::SynAck),
            CODE_DAT => Some(PacketType::Dat),
            CODE_ACK => Some(PacketType::Ack),
            CODE_STP => Some(PacketType::Stp),
            CODE_FIN => Some(PacketType::Fin),
            CODE_FINACK => Some(PacketType::FinAck),
            _ => None,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        PacketType::from_code(code).ok_or(PacketError::UnknownType(code))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Syn => "SYN",
            PacketType::SynAck => "SYNACK",
            PacketType::Dat => "DAT",
            PacketType::Ack => "ACK",
            PacketType::Stp => "STP",
            PacketType::Fin => "FIN",
            PacketType::FinAck => "FINACK",
        };
        f.write_str(name)
    }
}

/// Byte order of the length and index fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first, as existing XOR peers write it
    Big,
}

impl Endianness {
    /// Encode a u32 in this byte order
    pub const fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        }
    }

    /// Decode a u32 in this byte order
    pub const fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        }
    }
}

/// How the two 1-byte checksum fields are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// XOR checksums, compatible with existing peers
    ///
    /// Those peers write the most significant byte first, so byte-level
    /// compatibility also needs [`Endianness::Big`]. The index field is not
    /// covered: a flipped index bit can surface a message twice.
    #[default]
    Xor,
    /// Low byte of CRC-32C over the covered bytes
    Crc32c,
}

impl ChecksumMode {
    /// Checksum over a payload
    pub fn payload(self, payload: &[u8]) -> u8 {
        match self {
            ChecksumMode::Xor => payload.iter().fold(0u8, |acc, b| acc ^ b),
            ChecksumMode::Crc32c => crc32c::crc32c(payload) as u8,
        }
    }

    /// Checksum over the first ten encoded header bytes
    ///
    /// In XOR mode every length and index byte is OR'd with 0xFF before it is
    /// folded in, so those eight terms cancel out and the result is
    /// `type ^ payload_checksum`. Existing peers compute exactly this.
    pub fn header(self, body: &[u8; HEADER_BODY_LEN]) -> u8 {
        match self {
            ChecksumMode::Xor => {
                let fields = body[1..HEADER_BODY_LEN - 1]
                    .iter()
                    .fold(0u8, |acc, b| acc ^ (b | 0xFF));
                body[0] ^ fields ^ body[HEADER_BODY_LEN - 1]
            }
            ChecksumMode::Crc32c => crc32c::crc32c(body) as u8,
        }
    }
}

/// Wire-level settings both peers must agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireFormat {
    /// Byte order of the length and index fields
    pub endianness: Endianness,

    /// Checksum algorithm
    pub checksum: ChecksumMode,

    /// Headers announcing a longer payload are rejected as corrupt
    pub max_payload_len: u32,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            endianness: Endianness::Little,
            checksum: ChecksumMode::Xor,
            max_payload_len: MAX_PAYLOAD_SIZE,
        }
    }
}

impl WireFormat {
    /// Set the byte order
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Set the checksum algorithm
    pub fn checksum(mut self, checksum: ChecksumMode) -> Self {
        self.checksum = checksum;
        self
    }

    /// Set the payload length limit
    pub fn max_payload_len(mut self, max: u32) -> Self {
        self.max_payload_len = max;
        self
    }
}

/// Fixed-size packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type
    pub kind: PacketType,

    /// Length of the payload in bytes
    pub length: u32,

    /// Sequence index assigned by the sender
    pub index: u32,

    /// Checksum over the payload
    pub payload_checksum: u8,

    /// Checksum over the other header fields
    pub header_checksum: u8,
}

impl PacketHeader {
    /// Build a header for `payload`, filling in both checksums
    pub fn new(kind: PacketType, index: u32, payload: &[u8], wire: &WireFormat) -> Self {
        let length = payload.len() as u32;
        let payload_checksum = wire.checksum.payload(payload);
        let body = header_body(kind.code(), length, index, payload_checksum, wire.endianness);
        Self {
            kind,
            length,
            index,
            payload_checksum,
            header_checksum: wire.checksum.header(&body),
        }
    }

    /// Serialize to the 11 wire bytes
    pub fn to_bytes(&self, wire: &WireFormat) -> [u8; HEADER_LEN] {
        let body = header_body(
            self.kind.code(),
            self.length,
            self.index,
            self.payload_checksum,
            wire.endianness,
        );
        let mut out = [0u8; HEADER_LEN];
        out[..HEADER_BODY_LEN].copy_from_slice(&body);
        out[HEADER_BODY_LEN] = self.header_checksum;
        out
    }

    /// Validate the length limit
    pub fn validate(&self, wire: &WireFormat) -> Result<(), PacketError> {
        if self.length > wire.max_payload_len {
            return Err(PacketError::PayloadTooLarge(self.length, wire.max_payload_len));
        }
        Ok(())
    }
}

/// The ten checksummed header bytes
pub(crate) fn header_body(
    code: u8,
    length: u32,
    index: u32,
    payload_checksum: u8,
    endianness: Endianness,
) -> [u8; HEADER_BODY_LEN] {
    let mut body = [0u8; HEADER_BODY_LEN];
    body[0] = code;
    body[1..5].copy_from_slice(&endianness.write_u32(length));
    body[5..9].copy_from_slice(&endianness.write_u32(index));
    body[9] = payload_checksum;
    body
}

/// Complete relchan packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet header
    pub header: PacketHeader,

    /// Packet payload (empty for everything but DAT)
    pub payload: Bytes,
}

impl Packet {
    /// Create a packet, computing its checksums
    pub fn new(kind: PacketType, index: u32, payload: Bytes, wire: &WireFormat) -> Self {
        Self {
            header: PacketHeader::new(kind, index, &payload, wire),
            payload,
        }
    }

    /// Create a packet with no payload
    pub fn control(kind: PacketType, index: u32, wire: &WireFormat) -> Self {
        Self::new(kind, index, Bytes::new(), wire)
    }

    /// Packet type
    pub fn kind(&self) -> PacketType {
        self.header.kind
    }

    /// Sequence index
    pub fn index(&self) -> u32 {
        self.header.index
    }

    /// Total encoded size in bytes
    pub fn total_size(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Check that the header agrees with the payload
    pub fn validate(&self, wire: &WireFormat) -> Result<(), PacketError> {
        self.header.validate(wire)?;

        if self.payload.len() as u32 != self.header.length {
            return Err(PacketError::InvalidStructure(format!(
                "Payload length mismatch: header says {}, actual {}",
                self.header.length,
                self.payload.len()
            )));
        }

        Ok(())
    }
}
