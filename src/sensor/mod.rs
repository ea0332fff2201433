// src/sensor/mod.rs
//
// AFBR-S50 time-of-flight sensor on CAN: payload decoding, the per-session
// pipeline, and the controller that drives the adapter.

mod controller;
mod measurement;
mod pipeline;
mod session;

pub use controller::{SensorController, SensorState};
pub use measurement::{decode_measurement, Measurement, StatusKind, MEASUREMENT_LEN};
pub use pipeline::MeasurementPipeline;
pub use session::{measurement_stream, SensorSession};

/// Remote frame id that starts periodic measurements
pub const START_COMMAND_ID: u32 = 0x08;
/// Remote frame id that stops measurements
pub const STOP_COMMAND_ID: u32 = 0x09;
/// Id the sensor publishes measurement frames on
pub const SENSOR_DATA_ID: u32 = 0x01C;
