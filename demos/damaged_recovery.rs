//! Example demonstrating recovery from damaged data

use bytes::Bytes;
use relchan_core::{
    encoder::PacketBuilder, scanner::scan_stream_with_stats, ChecksumMode, PacketType, WireFormat,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Relchan Damaged Data Recovery Example\n");

    let wire = WireFormat::default().checksum(ChecksumMode::Crc32c);

    // Step 1: Create a clean stream with 40 packets
    println!("Step 1: Creating 40 packets...");
    let mut stream = Vec::new();
    for i in 1..=40 {
        let payload = format!("Important data from sensor {}", i);
        let encoded = PacketBuilder::new(PacketType::Dat)
            .index(i)
            .payload(Bytes::from(payload))
            .build(&wire)?;
        stream.extend_from_slice(&encoded);
    }

    let original_size = stream.len();
    println!("Created clean stream: {} bytes\n", original_size);

    // Step 2: Simulate damage
    println!("Step 2: Simulating damage...");

    stream[300..400].fill(0xFF);
    println!("Overwrote bytes 300-400");

    stream[700..760].fill(0x03);
    println!("Overwrote bytes 700-760 with a fake type code");

    stream.drain(1000..1017);
    println!("Deleted bytes 1000-1017");

    for at in (1300..1500).step_by(37) {
        stream[at] ^= 0x20;
    }
    println!("Flipped a bit every 37 bytes in 1300-1500");

    println!("Damaged stream: {} bytes\n", stream.len());

    // Step 3: Scan and recover
    println!("Step 3: Scanning damaged stream...");
    let (located, stats) = scan_stream_with_stats(&stream, &wire);

    println!("Scan Results:");
    println!("  Bytes scanned:     {}", stats.bytes_scanned);
    println!("  Candidates tried:  {}", stats.candidates);
    println!("  Valid packets:     {}", stats.packets_found);
    println!("  Decode failures:   {}", stats.decode_failures);
    println!("  Recovery rate:     {:.1}%\n", stats.recovery_rate());

    // Step 4: Report what is missing
    let found: Vec<u32> = located.iter().map(|hit| hit.packet.index()).collect();
    let missing: Vec<u32> = (1..=40).filter(|i| !found.contains(i)).collect();
    println!("Step 4: Checking sequence...");
    println!("  Recovered indices: {:?}", found);
    println!("  Missing indices:   {:?}", missing);

    Ok(())
}
