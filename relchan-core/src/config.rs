//! Channel configuration

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_FRAME_TIMEOUT, DEFAULT_TIMEOUT, MAX_PAYLOAD_SIZE,
};
use crate::error::ChannelError;
use crate::types::WireFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one [`crate::channel::ReliableChannel`]
///
/// Durations are (de)serialized as whole milliseconds, so a JSON config reads
/// like `{"name": "uplink", "timeout": 250, "wire": {"endianness": "big"}}`.
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Engine thread name and log field
    pub name: String,

    /// Retransmission interval; also how long the engine waits for a packet
    #[serde(with = "millis")]
    pub timeout: Duration,

    /// Upper bound for `connect` and `disconnect`
    #[serde(with = "millis")]
    pub connect_timeout: Duration,

    /// How long to wait for the rest of a partially received packet
    #[serde(with = "millis")]
    pub frame_timeout: Duration,

    /// Wire format shared with the peer
    pub wire: WireFormat,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "relchan".to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            wire: WireFormat::default(),
        }
    }
}

impl ChannelConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the retransmission interval
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect/disconnect bound
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the partial-packet wait
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Set the wire format
    pub fn wire(mut self, wire: WireFormat) -> Self {
        self.wire = wire;
        self
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.timeout.is_zero() || self.connect_timeout.is_zero() || self.frame_timeout.is_zero() {
            return Err(ChannelError::Config("Timeouts must be greater than 0".into()));
        }

        if self.connect_timeout < self.timeout {
            return Err(ChannelError::Config(
                "Connect timeout must not be shorter than the retransmission timeout".into(),
            ));
        }

        if self.wire.max_payload_len == 0 || self.wire.max_payload_len > MAX_PAYLOAD_SIZE {
            return Err(ChannelError::Config(format!(
                "Maximum payload length must be between 1 and {}",
                MAX_PAYLOAD_SIZE
            )));
        }

        if self.name.contains('\0') {
            return Err(ChannelError::Config("Name must not contain NUL bytes".into()));
        }

        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
