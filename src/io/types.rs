// src/io/types.rs
//
// Messages crossing the boundary between a transport, the read loop and the consumer.

use serde::Serialize;

use super::error::IoError;
use super::slcan::codec::SlcanFrame;
use crate::sensor::Measurement;

// ============================================================================
// Inbound
// ============================================================================

/// One unit of input from a transport
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Raw adapter bytes (serial binding); may split lines anywhere
    Bytes(Vec<u8>),
    /// Whole frames (message-adapter binding)
    Frames(Vec<SlcanFrame>),
}

// ============================================================================
// Consumer Events
// ============================================================================

/// A measurement stamped with the host time it was decoded
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimedMeasurement {
    /// Host UNIX timestamp in microseconds
    pub timestamp_us: u64,
    #[serde(flatten)]
    pub measurement: Measurement,
}

/// Event delivered to the consumer of a sensor session
#[derive(Clone, Debug, PartialEq)]
pub enum SensorEvent {
    /// Decoded sensor measurement, in bus receive order
    Measurement(TimedMeasurement),
    /// Recoverable framing problem; the loop keeps running
    FramingError(IoError),
    /// Transport failure; the loop has stopped
    Fatal(IoError),
    /// Loop ended normally (reason)
    Ended(String),
}

impl SensorEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, SensorEvent::Fatal(_) | SensorEvent::Ended(_))
    }
}
