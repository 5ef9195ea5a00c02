//! Library entry for relchan-cli used by integration tests and embedding.

pub mod commands;

// Re-export commands for convenience
pub use commands::*;

use anyhow::{Context, Result};
use relchan_core::{ChannelConfig, ChecksumMode, Endianness, WireFormat};
use std::fs;

/// Load a JSON channel configuration, or the defaults when no path is given
pub fn load_config(path: Option<&str>) -> Result<ChannelConfig> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            serde_json::from_str::<ChannelConfig>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?
        }
        None => ChannelConfig::default(),
    };
    config.validate().context("Invalid channel configuration")?;
    Ok(config)
}

/// Apply the `--big-endian` / `--crc32c` flags on top of a base wire format
pub fn wire_format(base: WireFormat, big_endian: bool, crc32c: bool) -> WireFormat {
    let mut wire = base;
    if big_endian {
        wire = wire.endianness(Endianness::Big);
    }
    if crc32c {
        wire = wire.checksum(ChecksumMode::Crc32c);
    }
    wire
}
