// src/sensor/measurement.rs
//
// AFBR-S50 CAN measurement payload.
//
// Byte layout (big-endian, 8 bytes):
//   [0..3]  distance   Q9.14 metres (24 bits)
//   [3..5]  amplitude  UQ12.4 LSB
//   [5]     signal quality 0..100
//   [6..8]  status     two's complement status_t

use serde::Serialize;

use crate::io::IoError;

/// Payload length of one measurement frame
pub const MEASUREMENT_LEN: usize = 8;

/// Distance fixed-point scale (Q9.14)
const DISTANCE_SCALE: f64 = 16384.0;
/// Amplitude fixed-point scale (UQ12.4)
const AMPLITUDE_SCALE: f64 = 16.0;

/// One decoded sensor reading
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Measurement {
    pub distance_m: f64,
    pub amplitude: f64,
    pub quality: u8,
    pub status: i16,
}

/// Coarse reading of the signed status code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Ok,
    /// Positive codes are informational/warnings
    Warning,
    /// Negative codes are errors
    Error,
}

/// Decode a full measurement payload
pub fn decode_measurement(payload: &[u8; MEASUREMENT_LEN]) -> Measurement {
    let raw_distance =
        (u32::from(payload[0]) << 16) | (u32::from(payload[1]) << 8) | u32::from(payload[2]);
    let raw_amplitude = u16::from_be_bytes([payload[3], payload[4]]);

    Measurement {
        distance_m: f64::from(raw_distance) / DISTANCE_SCALE,
        amplitude: f64::from(raw_amplitude) / AMPLITUDE_SCALE,
        quality: payload[5],
        status: i16::from_be_bytes([payload[6], payload[7]]),
    }
}

impl Measurement {
    /// Decode from a frame payload. Bytes past the eighth are ignored.
    pub fn from_payload(payload: &[u8]) -> Result<Self, IoError> {
        let bytes: &[u8; MEASUREMENT_LEN] = payload
            .get(..MEASUREMENT_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or(IoError::ShortPayload { len: payload.len() })?;
        Ok(decode_measurement(bytes))
    }

    pub fn status_kind(&self) -> StatusKind {
        match self.status {
            0 => StatusKind::Ok,
            s if s > 0 => StatusKind::Warning,
            _ => StatusKind::Error,
        }
    }
}
