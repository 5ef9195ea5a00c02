//! Basic encoding example

use bytes::Bytes;
use relchan_core::{encoder::PacketBuilder, PacketType, WireFormat};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Relchan Basic Encoding Example\n");

    let wire = WireFormat::default();
    let mut output = Vec::new();

    let syn = PacketBuilder::new(PacketType::Syn).index(0).build(&wire)?;
    println!("SYN:      {}", hex_line(&syn));
    output.extend_from_slice(&syn);

    for i in 1..=5 {
        let payload = format!("Reading {} from the field unit", i);
        let encoded = PacketBuilder::new(PacketType::Dat)
            .index(i)
            .payload(Bytes::from(payload))
            .build(&wire)?;

        println!("DAT #{}:   {} bytes, header {}", i, encoded.len(), hex_line(&encoded[..11]));
        output.extend_from_slice(&encoded);
    }

    let fin = PacketBuilder::new(PacketType::Fin).index(6).build(&wire)?;
    println!("FIN:      {}", hex_line(&fin));
    output.extend_from_slice(&fin);

    std::fs::write("example_output.rlc", &output)?;

    println!("\nWrote {} bytes to example_output.rlc", output.len());
    println!("Use 'relchan scan --input example_output.rlc' to read it back");

    Ok(())
}

fn hex_line(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}
