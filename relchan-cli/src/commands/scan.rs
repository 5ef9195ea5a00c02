use anyhow::{Context, Result};
use relchan_core::{scanner::scan_stream_with_stats, WireFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::info;

#[derive(Serialize, Deserialize)]
struct RecoveredPacket {
    offset: usize,
    kind: String,
    index: u32,
    payload_len: u32,
    size: usize,
    payload: String,
    payload_hex: String,
}

pub fn execute(input: &str, output: Option<&str>, stats_only: bool, wire: &WireFormat) -> Result<()> {
    info!("Scanning file: {}", input);

    let data = fs::read(input)
        .with_context(|| format!("Failed to read input file: {}", input))?;

    info!("File size: {} bytes", data.len());

    let (located, stats) = scan_stream_with_stats(&data, wire);

    println!("\n=== Scan Results ===");
    println!("Bytes scanned:     {} bytes", stats.bytes_scanned);
    println!("Candidates tried:  {}", stats.candidates);
    println!("Valid packets:     {}", stats.packets_found);
    println!("Decode failures:   {}", stats.decode_failures);
    println!("Bytes recovered:   {} bytes", stats.bytes_recovered);
    println!("Recovery rate:     {:.2}%", stats.recovery_rate());
    println!();

    if stats_only {
        return Ok(());
    }

    let recovered: Vec<RecoveredPacket> = located
        .iter()
        .map(|hit| RecoveredPacket {
            offset: hit.offset,
            kind: hit.packet.kind().to_string(),
            index: hit.packet.index(),
            payload_len: hit.packet.header.length,
            size: hit.size,
            payload: String::from_utf8_lossy(&hit.packet.payload).to_string(),
            payload_hex: hex::encode(&hit.packet.payload),
        })
        .collect();

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&recovered)
            .with_context(|| "Failed to serialize recovered packets")?;

        fs::write(output_path, json)
            .with_context(|| format!("Failed to write output file: {}", output_path))?;

        info!("Recovered packets written to: {}", output_path);
    } else {
        println!("=== Recovered Packets ===");
        for packet in &recovered {
            println!(
                "{} #{} @ offset {}: {} bytes",
                packet.kind, packet.index, packet.offset, packet.size
            );
        }
    }

    Ok(())
}
