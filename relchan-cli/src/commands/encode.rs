use anyhow::{Context, Result};
use bytes::Bytes;
use relchan_core::{encoder::PacketBuilder, PacketType, WireFormat};
use serde_json::Value;
use std::fs;
use tracing::info;

/// Payload bytes for one JSON value: strings are sent as their UTF-8 text,
/// anything else as compact JSON
fn payload_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        other => serde_json::to_vec(other).context("Failed to serialize payload"),
    }
}

pub fn execute(input: &str, output: &str, start_index: u32, wire: &WireFormat) -> Result<()> {
    info!("Encoding messages from {} to {}", input, output);

    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file: {}", input))?;

    let messages: Vec<Value> = serde_json::from_str(&content)
        .with_context(|| "Failed to parse JSON input (expected an array)")?;

    info!("Found {} messages to encode", messages.len());

    let mut output_data = Vec::new();

    for (i, message) in messages.iter().enumerate() {
        let index = start_index.wrapping_add(i as u32);
        let payload = payload_bytes(message)?;

        let encoded = PacketBuilder::new(PacketType::Dat)
            .index(index)
            .payload(Bytes::from(payload))
            .build(wire)
            .with_context(|| format!("Failed to encode message {}", index))?;

        output_data.extend_from_slice(&encoded);

        info!("Encoded DAT #{} ({} bytes)", index, encoded.len());
    }

    fs::write(output, &output_data)
        .with_context(|| format!("Failed to write output file: {}", output))?;

    info!(
        "Successfully encoded {} packets ({} bytes total)",
        messages.len(),
        output_data.len()
    );

    Ok(())
}
