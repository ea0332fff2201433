// src/io/error.rs
//
// Error taxonomy shared by the transports, the SLCAN codec and the sensor controller.

use thiserror::Error;

/// Errors raised anywhere between the byte stream and the decoded measurement.
///
/// Only `Transport` is fatal to a running session. `Framing` is reported and the
/// session continues. `MalformedLine` and `ShortPayload` are absorbed before they
/// reach a consumer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IoError {
    /// Failed to open the underlying device
    #[error("{device}: connection failed: {message}")]
    Connection { device: String, message: String },

    /// Read or write failure on an open device
    #[error("{device}: transport error: {message}")]
    Transport { device: String, message: String },

    /// Accumulation buffer exceeded its bound without a line terminator
    #[error("framing error: discarded {discarded} bytes without terminator (limit {limit})")]
    Framing { discarded: usize, limit: usize },

    /// Tagged line whose identifier or payload is not valid hex
    #[error("malformed line: {0}")]
    MalformedLine(String),

    /// Data frame carrying fewer bytes than a measurement needs
    #[error("short payload: {len} bytes, need 8")]
    ShortPayload { len: usize },

    /// Protocol-level rejection (unencodable command, unexpected frame)
    #[error("{device}: protocol error: {message}")]
    Protocol { device: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Command issued to a session that has already stopped
    #[error("sensor session stopped")]
    SessionStopped,
}

impl IoError {
    pub fn connection(device: &str, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn transport(device: &str, message: impl Into<String>) -> Self {
        IoError::Transport {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn protocol(device: &str, message: impl Into<String>) -> Self {
        IoError::Protocol {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        IoError::Configuration(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        IoError::MalformedLine(message.into())
    }

    /// Whether the read loop must terminate after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, IoError::Transport { .. } | IoError::Connection { .. })
    }
}

impl From<IoError> for String {
    fn from(e: IoError) -> Self {
        e.to_string()
    }
}
