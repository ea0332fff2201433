// src/io/mod.rs
//
// IO layer: transports, the slcan protocol codec and the messages handed to
// the sensor controller. Protocol logic stays independent of the binding, so
// the serial and SocketCAN backends share the same read loop.

// Core modules
pub mod codec; // Frame codec trait and implementations
mod error;
pub mod transport;
mod types;

// Bindings
pub mod slcan;
#[cfg(target_os = "linux")]
pub mod socketcan;

pub use codec::FrameCodec;
pub use error::IoError;
pub use transport::{CommandWriter, InboundReader, Transport};
pub use types::{Inbound, SensorEvent, TimedMeasurement};

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
