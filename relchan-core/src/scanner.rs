//! Resynchronization over damaged or noisy input
//!
//! Both entry points use the same rule: treat every byte position as a
//! candidate packet start, try to decode a packet there, and on any failure
//! slide forward by exactly one byte. A packet is only accepted once its
//! header checksum *and* payload checksum agree.
//!
//! [`scan_stream`] runs the rule over a complete capture. [`resync`] runs it
//! live over a [`ByteReader`], pulling more bytes as candidates need them.

use crate::decoder::{decode_packet, decode_packet_zero_copy};
use crate::error::PacketError;
use crate::medium::ByteSource;
use crate::reader::ByteReader;
use crate::types::{Packet, PacketType, WireFormat};
use bytes::Bytes;
use std::io;
use std::time::Instant;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// A packet found at a specific offset in the stream
#[derive(Debug, Clone)]
pub struct LocatedPacket {
    /// Byte offset of the packet's type code
    pub offset: usize,

    /// The decoded packet
    pub packet: Packet,

    /// Total size of the packet in bytes
    pub size: usize,
}

/// Scan a byte stream for valid packets, even if the stream is damaged
///
/// This function:
/// 1. Skips to the next byte that is a known type code
/// 2. Attempts to decode a packet at that position
/// 3. On success jumps past the packet, on failure slides one byte
///
/// A packet cut off by the end of the input counts as a failure.
pub fn scan_stream(data: &[u8], wire: &WireFormat) -> Vec<LocatedPacket> {
    scan_stream_with_stats(data, wire).0
}

/// Position of the next byte that could start a packet
fn find_candidate(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| PacketType::from_code(b).is_some())
}

/// Scan statistics
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    /// Total bytes scanned
    pub bytes_scanned: usize,

    /// Number of valid packets found
    pub packets_found: usize,

    /// Number of positions whose byte was a known type code
    pub candidates: usize,

    /// Number of candidates that failed to decode
    pub decode_failures: usize,

    /// Total bytes recovered (sum of all valid packet sizes)
    pub bytes_recovered: usize,
}

impl ScanStats {
    /// Calculate recovery rate as a percentage
    pub fn recovery_rate(&self) -> f64 {
        if self.bytes_scanned == 0 {
            0.0
        } else {
            (self.bytes_recovered as f64 / self.bytes_scanned as f64) * 100.0
        }
    }
}

/// Scan stream with statistics
pub fn scan_stream_with_stats(data: &[u8], wire: &WireFormat) -> (Vec<LocatedPacket>, ScanStats) {
    let mut stats = ScanStats {
        bytes_scanned: data.len(),
        ..Default::default()
    };
    let mut results = Vec::new();
    let mut pos = 0;

    #[cfg(feature = "logging")]
    debug!("Starting stream scan of {} bytes", data.len());

    while let Some(rel) = find_candidate(&data[pos..]) {
        let at = pos + rel;
        stats.candidates += 1;

        match decode_packet(&data[at..], wire) {
            Ok((packet, size)) => {
                #[cfg(feature = "logging")]
                trace!("{} #{} at offset {} ({} bytes)", packet.kind(), packet.index(), at, size);

                stats.bytes_recovered += size;
                results.push(LocatedPacket {
                    offset: at,
                    packet,
                    size,
                });
                pos = at + size;
            }
            Err(_) => {
                stats.decode_failures += 1;
                pos = at + 1;
            }
        }
    }

    stats.packets_found = results.len();

    #[cfg(feature = "logging")]
    debug!(
        "Scan complete: found {} valid packets out of {} bytes scanned",
        results.len(),
        data.len()
    );

    (results, stats)
}

/// Scan a byte buffer and return packets whose payloads slice `buf`
pub fn scan_stream_zero_copy(buf: Bytes, wire: &WireFormat) -> Vec<LocatedPacket> {
    let mut results = Vec::new();
    let mut pos = 0;
    while let Some(rel) = find_candidate(&buf[pos..]) {
        let at = pos + rel;
        match decode_packet_zero_copy(&buf.slice(at..), wire) {
            Ok((packet, size)) => {
                results.push(LocatedPacket {
                    offset: at,
                    packet,
                    size,
                });
                pos = at + size;
            }
            Err(_) => pos = at + 1,
        }
    }
    results
}

/// Recover framing on a live stream after a corruption error
///
/// The packet at the front of the carryover buffer is assumed to have just
/// failed to decode, so the scan starts one byte in. From there it looks
/// (pulling more bytes from the source as candidates need them) for the first
/// packet whose header and payload both validate. Bytes before that packet
/// are discarded; bytes after it stay buffered. Returns `Ok(None)` once
/// `deadline` passes without a hit, in which case a candidate still waiting
/// for its tail stays buffered for the next attempt.
pub fn resync<S: ByteSource>(
    reader: &mut ByteReader<S>,
    wire: &WireFormat,
    deadline: Instant,
) -> io::Result<Option<Packet>> {
    let mut offset = if reader.is_empty() { 0 } else { 1 };
    let mut skipped = 0usize;

    loop {
        match find_candidate(&reader.buffered()[offset..]) {
            Some(rel) => offset += rel,
            None => {
                skipped += reader.len();
                reader.consume(reader.len());
                offset = 0;
                if !reader.fill_to(1, deadline)? {
                    #[cfg(feature = "logging")]
                    debug!("Resync gave up after discarding {} bytes", skipped);
                    return Ok(None);
                }
                continue;
            }
        }

        match decode_packet(&reader.buffered()[offset..], wire) {
            Ok((packet, size)) => {
                reader.consume(offset + size);
                #[cfg(feature = "logging")]
                debug!(
                    "Resync hit: {} #{} after discarding {} bytes",
                    packet.kind(),
                    packet.index(),
                    skipped + offset
                );
                #[cfg(not(feature = "logging"))]
                let _ = skipped;
                return Ok(Some(packet));
            }
            Err(PacketError::Incomplete { expected, .. }) => {
                if !reader.fill_to(offset + expected, deadline)? {
                    reader.consume(offset);
                    #[cfg(feature = "logging")]
                    debug!(
                        "Resync ran out of time with a {}-byte candidate pending",
                        reader.len()
                    );
                    return Ok(None);
                }
            }
            Err(_) => offset += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PacketBuilder;
    use crate::pipe::pipe;
    use crate::types::ChecksumMode;
    use std::io::Write;
    use std::time::Duration;

    fn dat(index: u32, payload: &'static str, wire: &WireFormat) -> Bytes {
        PacketBuilder::new(PacketType::Dat)
            .index(index)
            .payload(Bytes::from(payload))
            .build(wire)
            .unwrap()
    }

    #[test]
    fn test_scan_clean_stream() {
        let wire = WireFormat::default();
        let mut stream = Vec::new();
        for i in 1..=3 {
            stream.extend_from_slice(&dat(i, "packet", &wire));
        }

        let results = scan_stream(&stream, &wire);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].packet.index(), 1);
        assert_eq!(results[1].packet.index(), 2);
        assert_eq!(results[2].packet.index(), 3);
        assert_eq!(results[1].offset, results[0].size);
    }

    #[test]
    fn test_scan_with_corruption() {
        let wire = WireFormat::default().checksum(ChecksumMode::Crc32c);
        let mut stream = Vec::new();
        stream.extend_from_slice(&dat(1, "packet 1", &wire));
        stream.extend_from_slice(b"GARBAGE DATA HERE!!!");
        stream.extend_from_slice(&dat(2, "packet 2", &wire));

        let results = scan_stream(&stream, &wire);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].packet.payload.as_ref(), b"packet 1");
        assert_eq!(results[1].packet.payload.as_ref(), b"packet 2");
    }

    #[test]
    fn test_scan_missing_start() {
        let wire = WireFormat::default();
        let first = dat(1, "packet 1", &wire);
        let mut stream = Vec::new();
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&dat(2, "packet 2", &wire));

        let results = scan_stream(&stream[5..], &wire);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].packet.index(), 2);
        assert_eq!(results[0].offset, first.len() - 5);
    }

    #[test]
    fn test_scan_truncated_tail() {
        let wire = WireFormat::default();
        let mut stream = dat(1, "whole", &wire).to_vec();
        let cut = dat(2, "cut short", &wire);
        stream.extend_from_slice(&cut[..cut.len() - 2]);

        let results = scan_stream(&stream, &wire);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_scan_stats() {
        let wire = WireFormat::default();
        let packet = dat(1, "test", &wire);

        let (results, stats) = scan_stream_with_stats(&packet, &wire);

        assert_eq!(results.len(), 1);
        assert_eq!(stats.packets_found, 1);
        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.decode_failures, 0);
        assert_eq!(stats.bytes_scanned, packet.len());
        assert!(stats.recovery_rate() > 99.0);
    }

    #[test]
    fn test_zero_copy_matches_copying_scan() {
        let wire = WireFormat::default();
        let mut stream = vec![0xEE, 0x03, 0x42];
        stream.extend_from_slice(&dat(9, "nine", &wire));
        stream.extend_from_slice(&[0x04; 7]);
        stream.extend_from_slice(&dat(10, "ten", &wire));

        let copied = scan_stream(&stream, &wire);
        let sliced = scan_stream_zero_copy(Bytes::from(stream), &wire);

        assert_eq!(copied.len(), sliced.len());
        for (a, b) in copied.iter().zip(&sliced) {
            assert_eq!(a.offset, b.offset);
            assert_eq!(a.packet, b.packet);
        }
    }

    #[test]
    fn test_resync_discards_prefix_and_keeps_tail() {
        let wire = WireFormat::default();
        let (mut writer, source) = pipe();
        let mut reader = ByteReader::new(source);

        let next = dat(8, "next", &wire);
        writer.write_all(&[0x03, 0xFF, 0x01, 0x00, 0x00]).unwrap();
        writer.write_all(&dat(7, "found", &wire)).unwrap();
        writer.write_all(&next).unwrap();
        assert!(reader.wait_readable(Duration::from_millis(50)).unwrap());

        let deadline = Instant::now() + Duration::from_millis(200);
        let packet = resync(&mut reader, &wire, deadline).unwrap().unwrap();
        assert_eq!(packet.index(), 7);
        assert_eq!(packet.payload.as_ref(), b"found");

        let deadline = Instant::now() + Duration::from_millis(200);
        assert!(reader.fill_to(next.len(), deadline).unwrap());
        assert_eq!(reader.buffered(), next.as_ref());
    }

    #[test]
    fn test_resync_waits_for_late_bytes() {
        let wire = WireFormat::default();
        let (mut writer, source) = pipe();
        let mut reader = ByteReader::new(source);
        let packet = dat(3, "arrives in pieces", &wire);

        writer.write_all(&[0xAA, 0xBB]).unwrap();
        writer.write_all(&packet[..6]).unwrap();
        let tail = packet.slice(6..);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.write_all(&tail).unwrap();
            writer
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        let found = resync(&mut reader, &wire, deadline).unwrap().unwrap();
        assert_eq!(found.payload.as_ref(), b"arrives in pieces");
        assert!(reader.is_empty());
        handle.join().unwrap();
    }

    #[test]
    fn test_resync_gives_up_at_deadline() {
        let wire = WireFormat::default();
        let (mut writer, source) = pipe();
        let mut reader = ByteReader::new(source);
        writer.write_all(&[0x00, 0x10, 0x20]).unwrap();

        let deadline = Instant::now() + Duration::from_millis(30);
        assert!(resync(&mut reader, &wire, deadline).unwrap().is_none());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_resync_skips_payload_mismatch() {
        let wire = WireFormat::default();
        let (mut writer, source) = pipe();
        let mut reader = ByteReader::new(source);

        let mut damaged = dat(1, "damaged", &wire).to_vec();
        let last = damaged.len() - 1;
        damaged[last] ^= 0x01;
        writer.write_all(&damaged).unwrap();
        writer.write_all(&dat(2, "intact", &wire)).unwrap();

        let deadline = Instant::now() + Duration::from_millis(200);
        let found = resync(&mut reader, &wire, deadline).unwrap().unwrap();
        assert_eq!(found.index(), 2);
    }
}
