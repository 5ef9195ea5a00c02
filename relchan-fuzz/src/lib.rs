//! Fuzz entry points for the relchan-core decoder and scanner
//!
//! To use with cargo-fuzz:
//! 1. Install cargo-fuzz: cargo install cargo-fuzz
//! 2. Run fuzzer: cargo fuzz run fuzz_decoder

use relchan_core::{ChecksumMode, Endianness, WireFormat};

/// Every byte order and checksum combination
fn wire_formats() -> [WireFormat; 4] {
    let little = WireFormat::default();
    let big = little.endianness(Endianness::Big);
    [
        little,
        big,
        little.checksum(ChecksumMode::Crc32c),
        big.checksum(ChecksumMode::Crc32c),
    ]
}

pub fn fuzz_decode(data: &[u8]) {
    use relchan_core::decoder::decode_packet_from_bytes;

    // Try to decode - should never panic
    for wire in wire_formats() {
        let _ = decode_packet_from_bytes(data, &wire);
    }
}

pub fn fuzz_scan(data: &[u8]) {
    use relchan_core::scanner::scan_stream;

    // Try to scan - should never panic
    for wire in wire_formats() {
        let _ = scan_stream(data, &wire);
    }
}
