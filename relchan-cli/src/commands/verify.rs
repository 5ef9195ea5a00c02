use anyhow::{Context, Result};
use colored::*;
use relchan_core::{decoder::decode_packet, PacketError, WireFormat};
use std::fs;
use std::io::{self, Read};
use tracing::{info, warn};

/// Outcome of a strict sequential decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Packets decoded before the first failure
    pub packets: usize,
    /// Bytes those packets covered
    pub bytes_valid: usize,
    /// Offset and cause of the first failure, if any
    pub first_error: Option<(usize, PacketError)>,
}

impl VerifyReport {
    /// Whether the whole input decoded cleanly
    pub fn is_clean(&self) -> bool {
        self.first_error.is_none()
    }
}

/// Decode packets back to back from the start of `data`, stopping at the first failure
pub fn verify_bytes(data: &[u8], wire: &WireFormat) -> VerifyReport {
    let mut offset = 0;
    let mut packets = 0;

    while offset < data.len() {
        match decode_packet(&data[offset..], wire) {
            Ok((_, used)) => {
                offset += used;
                packets += 1;
            }
            Err(e) => {
                return VerifyReport {
                    packets,
                    bytes_valid: offset,
                    first_error: Some((offset, e)),
                }
            }
        }
    }

    VerifyReport {
        packets,
        bytes_valid: offset,
        first_error: None,
    }
}

pub fn execute(input: &str, wire: &WireFormat) -> Result<VerifyReport> {
    info!("Verifying file: {}", input);

    // Read input file or stdin
    let data = if input == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        fs::read(input).with_context(|| format!("Failed to read input file: {}", input))?
    };

    let report = verify_bytes(&data, wire);

    println!("\n=== Verification Results ===");
    println!("Total bytes:        {}", data.len());
    println!("Valid packets:      {}", report.packets.to_string().green());
    println!("Valid bytes:        {}", report.bytes_valid);

    println!("\n=== Summary ===");
    match &report.first_error {
        None if report.packets == 0 => println!("{} File is empty", "!".yellow()),
        None => println!("{} File is a clean packet stream", "✓".green()),
        Some((offset, e)) => {
            warn!("First failure at offset {}: {}", offset, e);
            println!("{} Corruption at offset {}: {}", "✗".red(), offset, e);
            println!("  Run 'relchan scan' to recover what follows");
        }
    }

    Ok(report)
}
