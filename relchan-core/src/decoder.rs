//! Packet decoding (strict mode)

use crate::constants::{
    HEADER_BODY_LEN, HEADER_CHECKSUM_OFFSET, HEADER_LEN, INDEX_OFFSET, LENGTH_OFFSET,
    PAYLOAD_CHECKSUM_OFFSET,
};
use crate::error::PacketError;
use crate::medium::ByteSource;
use crate::reader::ByteReader;
use crate::types::{Packet, PacketHeader, PacketType, WireFormat};
use bytes::Bytes;
use std::io::Read;
use std::time::Instant;

/// Decode and validate the header at the front of `buf`
///
/// Fails fast with [`PacketError::UnknownType`] as soon as the first byte is
/// available, so a stray byte never makes the caller wait for a full header.
pub fn decode_header(buf: &[u8], wire: &WireFormat) -> Result<PacketHeader, PacketError> {
    let Some(&code) = buf.first() else {
        return Err(PacketError::Incomplete {
            expected: HEADER_LEN,
            actual: 0,
        });
    };
    let kind = PacketType::try_from(code)?;

    if buf.len() < HEADER_LEN {
        return Err(PacketError::Incomplete {
            expected: HEADER_LEN,
            actual: buf.len(),
        });
    }

    let mut body = [0u8; HEADER_BODY_LEN];
    body.copy_from_slice(&buf[..HEADER_BODY_LEN]);

    let expected = buf[HEADER_CHECKSUM_OFFSET];
    let actual = wire.checksum.header(&body);
    if expected != actual {
        return Err(PacketError::HeaderChecksum { expected, actual });
    }

    let length = wire.endianness.read_u32([
        buf[LENGTH_OFFSET],
        buf[LENGTH_OFFSET + 1],
        buf[LENGTH_OFFSET + 2],
        buf[LENGTH_OFFSET + 3],
    ]);
    let index = wire.endianness.read_u32([
        buf[INDEX_OFFSET],
        buf[INDEX_OFFSET + 1],
        buf[INDEX_OFFSET + 2],
        buf[INDEX_OFFSET + 3],
    ]);

    let header = PacketHeader {
        kind,
        length,
        index,
        payload_checksum: buf[PAYLOAD_CHECKSUM_OFFSET],
        header_checksum: expected,
    };
    header.validate(wire)?;

    Ok(header)
}

/// Check the payload window that follows a valid header
///
/// Returns the total packet size on success.
fn check_payload(buf: &[u8], header: &PacketHeader, wire: &WireFormat) -> Result<usize, PacketError> {
    let total = HEADER_LEN + header.length as usize;
    if buf.len() < total {
        return Err(PacketError::Incomplete {
            expected: total,
            actual: buf.len(),
        });
    }

    let actual = wire.checksum.payload(&buf[HEADER_LEN..total]);
    if actual != header.payload_checksum {
        return Err(PacketError::PayloadChecksum {
            expected: header.payload_checksum,
            actual,
        });
    }

    Ok(total)
}

/// Decode one packet from the front of a byte slice
///
/// Trailing bytes are left alone; the second tuple element is the number of
/// bytes the packet occupied.
pub fn decode_packet(buf: &[u8], wire: &WireFormat) -> Result<(Packet, usize), PacketError> {
    let header = decode_header(buf, wire)?;
    let total = check_payload(buf, &header, wire)?;

    let packet = Packet {
        header,
        payload: Bytes::copy_from_slice(&buf[HEADER_LEN..total]),
    };
    Ok((packet, total))
}

/// Decode one packet from the front of a byte buffer without copying the payload
///
/// The returned packet's payload is a slice of `buf`.
pub fn decode_packet_zero_copy(buf: &Bytes, wire: &WireFormat) -> Result<(Packet, usize), PacketError> {
    let header = decode_header(buf, wire)?;
    let total = check_payload(buf, &header, wire)?;

    let packet = Packet {
        header,
        payload: buf.slice(HEADER_LEN..total),
    };
    Ok((packet, total))
}

/// Decode the packet at the front of a reader's carryover buffer
///
/// Waits until `deadline` for the rest of a packet whose first bytes are
/// already buffered. Bytes are consumed only on success; on any error the
/// buffer is left untouched for the resynchronizer.
pub fn read_packet<S: ByteSource>(
    reader: &mut ByteReader<S>,
    wire: &WireFormat,
    deadline: Instant,
) -> Result<Packet, PacketError> {
    loop {
        match decode_packet(reader.buffered(), wire) {
            Ok((packet, used)) => {
                reader.consume(used);
                return Ok(packet);
            }
            Err(PacketError::Incomplete { expected, actual }) => {
                if !reader.fill_to(expected, deadline)? {
                    return Err(PacketError::Incomplete {
                        expected,
                        actual: reader.len().max(actual),
                    });
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decode a byte slice that must hold exactly one packet
pub fn decode_packet_from_bytes(data: &[u8], wire: &WireFormat) -> Result<Packet, PacketError> {
    let (packet, used) = decode_packet(data, wire)?;
    if used != data.len() {
        return Err(PacketError::InvalidStructure(format!(
            "{} trailing bytes after packet",
            data.len() - used
        )));
    }
    Ok(packet)
}

/// Decode the next packet from a blocking reader
///
/// An end of stream before the first byte yields `Ok(None)`; an end of stream
/// in the middle of a packet is [`PacketError::Incomplete`].
pub fn decode_from_reader<R: Read>(reader: &mut R, wire: &WireFormat) -> Result<Option<Packet>, PacketError> {
    let mut header_buf = [0u8; HEADER_LEN];

    let first = read_fully(reader, &mut header_buf[..1])?;
    if first == 0 {
        return Ok(None);
    }
    // Reject unknown types before reading further
    PacketType::try_from(header_buf[0])?;

    let got = read_fully(reader, &mut header_buf[1..])?;
    if got < HEADER_LEN - 1 {
        return Err(PacketError::Incomplete {
            expected: HEADER_LEN,
            actual: got + 1,
        });
    }
    let header = decode_header(&header_buf, wire)?;

    let mut payload = vec![0u8; header.length as usize];
    let got = read_fully(reader, &mut payload)?;
    if got < payload.len() {
        return Err(PacketError::Incomplete {
            expected: HEADER_LEN + payload.len(),
            actual: HEADER_LEN + got,
        });
    }

    let actual = wire.checksum.payload(&payload);
    if actual != header.payload_checksum {
        return Err(PacketError::PayloadChecksum {
            expected: header.payload_checksum,
            actual,
        });
    }

    Ok(Some(Packet {
        header,
        payload: Bytes::from(payload),
    }))
}

/// Like `read_exact`, but reports how much was read before end of stream
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, PacketError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PacketBuilder;
    use crate::types::{ChecksumMode, Endianness};

    fn dat(index: u32, payload: &'static [u8], wire: &WireFormat) -> Bytes {
        PacketBuilder::new(PacketType::Dat)
            .index(index)
            .payload(Bytes::from_static(payload))
            .build(wire)
            .unwrap()
    }

    #[test]
    fn test_decode_simple_packet() {
        let wire = WireFormat::default();
        let encoded = dat(1, b"Hello, relchan!", &wire);

        let decoded = decode_packet_from_bytes(&encoded, &wire).unwrap();
        assert_eq!(decoded.kind(), PacketType::Dat);
        assert_eq!(decoded.index(), 1);
        assert_eq!(decoded.payload.as_ref(), b"Hello, relchan!");
    }

    #[test]
    fn test_decode_unknown_type_fails_fast() {
        let wire = WireFormat::default();
        let result = decode_packet(&[0x42], &wire);

        assert_eq!(result, Err(PacketError::UnknownType(0x42)));
    }

    #[test]
    fn test_decode_incomplete_header() {
        let wire = WireFormat::default();
        let encoded = dat(9, b"abc", &wire);

        let result = decode_packet(&encoded[..5], &wire);
        assert_eq!(
            result,
            Err(PacketError::Incomplete {
                expected: HEADER_LEN,
                actual: 5
            })
        );
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let wire = WireFormat::default();
        let encoded = dat(9, b"abcdef", &wire);

        let result = decode_packet(&encoded[..HEADER_LEN + 2], &wire);
        assert_eq!(
            result,
            Err(PacketError::Incomplete {
                expected: HEADER_LEN + 6,
                actual: HEADER_LEN + 2
            })
        );
    }

    #[test]
    fn test_decode_bad_header_checksum() {
        let wire = WireFormat::default();
        let mut encoded = dat(9, b"abc", &wire).to_vec();
        encoded[HEADER_CHECKSUM_OFFSET] ^= 0x10;

        let result = decode_packet(&encoded, &wire);
        assert!(matches!(result, Err(PacketError::HeaderChecksum { .. })));
    }

    #[test]
    fn test_decode_bad_payload_checksum() {
        let wire = WireFormat::default();
        let mut encoded = dat(9, b"abc", &wire).to_vec();
        encoded[HEADER_LEN + 1] ^= 0x01;

        let result = decode_packet(&encoded, &wire);
        assert!(matches!(result, Err(PacketError::PayloadChecksum { .. })));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let wire = WireFormat::default().max_payload_len(8);
        // XOR header checksum ignores the length field, so forge one freely
        let mut encoded = dat(1, b"", &wire).to_vec();
        encoded[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&1000u32.to_le_bytes());

        let result = decode_header(&encoded, &wire);
        assert_eq!(result, Err(PacketError::PayloadTooLarge(1000, 8)));
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let wire = WireFormat::default().checksum(ChecksumMode::Crc32c);
        let mut stream = dat(1, b"one", &wire).to_vec();
        let first_len = stream.len();
        stream.extend_from_slice(&dat(2, b"two", &wire));

        let (first, used) = decode_packet(&stream, &wire).unwrap();
        assert_eq!(first.index(), 1);
        assert_eq!(used, first_len);

        let (second, _) = decode_packet(&stream[used..], &wire).unwrap();
        assert_eq!(second.payload.as_ref(), b"two");
    }

    #[test]
    fn test_zero_copy_round_trip() {
        let wire = WireFormat::default().endianness(Endianness::Big);
        let encoded = dat(77, b"zero copy", &wire);

        let (packet, used) = decode_packet_zero_copy(&encoded, &wire).unwrap();
        assert_eq!(used, encoded.len());
        assert_eq!(packet.index(), 77);
        assert_eq!(packet.payload.as_ref(), b"zero copy");
    }

    #[test]
    fn test_read_packet_waits_for_tail() {
        use crate::pipe::pipe;
        use std::io::Write;
        use std::time::Duration;

        let wire = WireFormat::default();
        let encoded = dat(5, b"split across writes", &wire);
        let (mut writer, source) = pipe();
        let mut reader = ByteReader::new(source);

        writer.write_all(&encoded[..4]).unwrap();
        assert!(reader.wait_readable(Duration::from_millis(50)).unwrap());
        writer.write_all(&encoded[4..]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let packet = read_packet(&mut reader, &wire, deadline).unwrap();
        assert_eq!(packet.payload.as_ref(), b"split across writes");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_packet_keeps_bytes_on_error() {
        use crate::pipe::pipe;
        use std::io::Write;
        use std::time::Duration;

        let wire = WireFormat::default();
        let encoded = dat(5, b"truncated", &wire);
        let (mut writer, source) = pipe();
        let mut reader = ByteReader::new(source);
        writer.write_all(&encoded[..HEADER_LEN + 3]).unwrap();
        assert!(reader.wait_readable(Duration::from_millis(50)).unwrap());

        let deadline = Instant::now() + Duration::from_millis(20);
        let result = read_packet(&mut reader, &wire, deadline);
        assert!(matches!(result, Err(PacketError::Incomplete { .. })));
        assert_eq!(reader.len(), HEADER_LEN + 3);
    }

    #[test]
    fn test_decode_from_reader() {
        let wire = WireFormat::default();
        let mut stream = dat(1, b"first", &wire).to_vec();
        stream.extend_from_slice(&dat(2, b"second", &wire));
        let mut cursor = std::io::Cursor::new(stream);

        let a = decode_from_reader(&mut cursor, &wire).unwrap().unwrap();
        let b = decode_from_reader(&mut cursor, &wire).unwrap().unwrap();
        assert_eq!(a.payload.as_ref(), b"first");
        assert_eq!(b.payload.as_ref(), b"second");
        assert!(decode_from_reader(&mut cursor, &wire).unwrap().is_none());
    }
}
