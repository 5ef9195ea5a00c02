//! Packet encoding

use crate::constants::HEADER_LEN;
use crate::error::PacketError;
use crate::types::{Packet, PacketHeader, PacketType, WireFormat};
use bytes::{BufMut, Bytes, BytesMut};

/// Encode a header and payload into bytes
///
/// The packet is encoded with the following layout:
/// 1. Type code (1 byte)
/// 2. Payload length (4 bytes, configured byte order)
/// 3. Sequence index (4 bytes, configured byte order)
/// 4. Payload checksum (1 byte)
/// 5. Header checksum (1 byte)
/// 6. Payload (variable length)
pub fn encode(header: &PacketHeader, payload: &[u8], wire: &WireFormat) -> Result<Bytes, PacketError> {
    header.validate(wire)?;

    if payload.len() as u32 != header.length {
        return Err(PacketError::InvalidStructure(format!(
            "Payload length mismatch: header says {}, actual {}",
            header.length,
            payload.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&header.to_bytes(wire));
    buf.put_slice(payload);

    Ok(buf.freeze())
}

/// Encode a complete Packet struct
pub fn encode_packet(packet: &Packet, wire: &WireFormat) -> Result<Bytes, PacketError> {
    encode(&packet.header, &packet.payload, wire)
}

/// Builder for constructing packets
pub struct PacketBuilder {
    kind: PacketType,
    index: u32,
    payload: Bytes,
}

impl PacketBuilder {
    /// Create a new packet builder
    pub fn new(kind: PacketType) -> Self {
        Self {
            kind,
            index: 0,
            payload: Bytes::new(),
        }
    }

    /// Set the sequence index
    pub fn index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Set the payload
    pub fn payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    /// Build and encode the packet
    pub fn build(self, wire: &WireFormat) -> Result<Bytes, PacketError> {
        let packet = self.build_struct(wire)?;
        encode_packet(&packet, wire)
    }

    /// Build the packet struct without encoding
    pub fn build_struct(self, wire: &WireFormat) -> Result<Packet, PacketError> {
        let packet = Packet::new(self.kind, self.index, self.payload, wire);
        packet.validate(wire)?;
        Ok(packet)
    }
}
