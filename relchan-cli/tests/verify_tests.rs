use bytes::Bytes;
use relchan_cli::commands::verify;
use relchan_core::encoder::PacketBuilder;
use relchan_core::{Endianness, PacketError, PacketType, WireFormat};
use std::fs;
use tempfile::tempdir;

/// Helper: create valid sequential packets
fn create_valid_packets(count: usize, wire: &WireFormat) -> Vec<u8> {
    let mut result = Vec::new();

    for i in 0..count {
        let packet = PacketBuilder::new(PacketType::Dat)
            .index(i as u32)
            .payload(Bytes::from(format!("Packet {}", i + 1)))
            .build(wire)
            .unwrap();
        result.extend_from_slice(&packet);
    }

    result
}

#[test]
fn verify_clean_stream() {
    let wire = WireFormat::default();
    let data = create_valid_packets(4, &wire);

    let report = verify::verify_bytes(&data, &wire);
    assert!(report.is_clean());
    assert_eq!(report.packets, 4);
    assert_eq!(report.bytes_valid, data.len());
}

#[test]
fn verify_stops_at_first_bad_byte() {
    let wire = WireFormat::default();
    let mut data = create_valid_packets(3, &wire);
    let first_len = 11 + "Packet 1".len();
    data.insert(first_len, 0x00);

    let report = verify::verify_bytes(&data, &wire);
    assert_eq!(report.packets, 1);
    assert_eq!(report.bytes_valid, first_len);
    assert_eq!(report.first_error, Some((first_len, PacketError::UnknownType(0x00))));
}

#[test]
fn verify_reports_truncated_tail() {
    let wire = WireFormat::default();
    let data = create_valid_packets(2, &wire);
    let truncated = &data[..data.len() - 2];

    let report = verify::verify_bytes(truncated, &wire);
    assert_eq!(report.packets, 1);
    assert!(matches!(
        report.first_error,
        Some((_, PacketError::Incomplete { .. }))
    ));
}

#[test]
fn verify_detects_payload_damage() {
    let wire = WireFormat::default();
    let mut data = create_valid_packets(1, &wire);
    let last = data.len() - 1;
    data[last] ^= 0x01;

    let report = verify::verify_bytes(&data, &wire);
    assert!(matches!(
        report.first_error,
        Some((0, PacketError::PayloadChecksum { .. }))
    ));
}

#[test]
fn verify_wrong_byte_order_fails() {
    let data = create_valid_packets(2, &WireFormat::default());
    let big = WireFormat::default().endianness(Endianness::Big);

    assert!(!verify::verify_bytes(&data, &big).is_clean());
}

#[test]
fn verify_file() {
    let td = tempdir().unwrap();
    let path = td.path().join("capture.rlc");
    let wire = WireFormat::default();
    fs::write(&path, create_valid_packets(3, &wire)).unwrap();

    let report = verify::execute(path.to_str().unwrap(), &wire).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.packets, 3);
}

#[test]
fn verify_empty_file_is_clean() {
    let td = tempdir().unwrap();
    let path = td.path().join("empty.rlc");
    fs::write(&path, b"").unwrap();

    let report = verify::execute(path.to_str().unwrap(), &WireFormat::default()).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.packets, 0);
}
