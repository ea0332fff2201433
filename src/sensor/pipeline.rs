// src/sensor/pipeline.rs
//
// Inbound chunk → events. Owns the line framer for one session; the read loop
// calls `process` once per chunk, synchronously.

use crate::io::slcan::{parse_line, FramerEvent, LineFramer, SlcanFrame};
use crate::io::{Inbound, IoError, SensorEvent, TimedMeasurement};

use super::measurement::Measurement;

pub struct MeasurementPipeline {
    framer: LineFramer,
    sensor_id: u32,
    /// Remote frames seen, normally the adapter echoing start/stop
    remote_echoes: u64,
}

impl MeasurementPipeline {
    pub fn new(sensor_id: u32, max_line_len: usize) -> Self {
        MeasurementPipeline {
            framer: LineFramer::new(max_line_len),
            sensor_id,
            remote_echoes: 0,
        }
    }

    /// Decode everything a chunk completes, in receive order.
    /// A trailing partial line stays buffered for the next chunk.
    pub fn process(&mut self, inbound: Inbound, timestamp_us: u64) -> Vec<SensorEvent> {
        let mut events = Vec::new();

        match inbound {
            Inbound::Bytes(bytes) => {
                let limit = self.framer.max_line_len();
                let mut frames = Vec::new();
                for event in self.framer.feed(&bytes) {
                    match event {
                        FramerEvent::Line(line) => frames.push(parse_line(&line)),
                        FramerEvent::Overflow { discarded } => {
                            tlog!(
                                "[sensor] Framing error: dropped {} bytes without terminator",
                                discarded
                            );
                            // Keep receive order: flush frames parsed before the overflow
                            route_frames(
                                self.sensor_id,
                                &mut self.remote_echoes,
                                frames.drain(..),
                                timestamp_us,
                                &mut events,
                            );
                            events.push(SensorEvent::FramingError(IoError::Framing { discarded, limit }));
                        }
                    }
                }
                route_frames(self.sensor_id, &mut self.remote_echoes, frames, timestamp_us, &mut events);
            }
            Inbound::Frames(frames) => {
                route_frames(self.sensor_id, &mut self.remote_echoes, frames, timestamp_us, &mut events)
            }
        }

        events
    }

    /// Remote frames discarded so far
    pub fn remote_echoes(&self) -> u64 {
        self.remote_echoes
    }

    /// Drop any buffered partial line
    pub fn reset(&mut self) {
        self.framer.reset();
    }
}

/// Keep measurements from `sensor_id`, count remote echoes, drop the rest
fn route_frames<I>(
    sensor_id: u32,
    remote_echoes: &mut u64,
    frames: I,
    timestamp_us: u64,
    events: &mut Vec<SensorEvent>,
) where
    I: IntoIterator<Item = SlcanFrame>,
{
    for frame in frames {
        match frame {
            SlcanFrame::Data { id, payload } if id == sensor_id => {
                // Short frames on the sensor id carry nothing to decode
                if let Ok(measurement) = Measurement::from_payload(&payload) {
                    events.push(SensorEvent::Measurement(TimedMeasurement {
                        timestamp_us,
                        measurement,
                    }));
                }
            }
            SlcanFrame::Remote { .. } => *remote_echoes += 1,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurements(events: &[SensorEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                SensorEvent::Measurement(m) => Some(m.measurement.distance_m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_decodes_sensor_line() {
        let mut pipeline = MeasurementPipeline::new(0x01C, 512);
        let events = pipeline.process(Inbound::Bytes(b"T01C0100000010500000\r".to_vec()), 1234);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SensorEvent::Measurement(m) => {
                assert_eq!(m.timestamp_us, 1234);
                assert_eq!(m.measurement.distance_m, 4.0);
                assert_eq!(m.measurement.quality, 80);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_seven_byte_frame_is_ignored() {
        let mut pipeline = MeasurementPipeline::new(0x01C, 512);
        let events = pipeline.process(Inbound::Bytes(b"T01C01020304050607\r".to_vec()), 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_other_ids_and_noise_are_ignored() {
        let mut pipeline = MeasurementPipeline::new(0x01C, 512);
        let stream = b"z\rR008\rT01D0100000010500000\r\x07\rT01C0200000010500000\r";
        let events = pipeline.process(Inbound::Bytes(stream.to_vec()), 0);
        assert_eq!(measurements(&events), vec![8.0]);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut pipeline = MeasurementPipeline::new(0x01C, 512);
        assert!(pipeline
            .process(Inbound::Bytes(b"T01C01000000".to_vec()), 0)
            .is_empty());
        let events = pipeline.process(Inbound::Bytes(b"10500000\rT01C02".to_vec()), 0);
        assert_eq!(measurements(&events), vec![4.0]);
    }

    #[test]
    fn test_overflow_reported_then_recovers() {
        let mut pipeline = MeasurementPipeline::new(0x01C, 32);
        let events = pipeline.process(Inbound::Bytes(vec![b'A'; 40]), 0);
        assert_eq!(
            events,
            vec![SensorEvent::FramingError(IoError::Framing {
                discarded: 40,
                limit: 32
            })]
        );

        let events = pipeline.process(Inbound::Bytes(b"AAAA\rT01C0100000010500000\r".to_vec()), 0);
        assert_eq!(measurements(&events), vec![4.0]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_frames_skip_framer() {
        let mut pipeline = MeasurementPipeline::new(0x01C, 512);
        let frames = vec![
            SlcanFrame::Remote { id: 0x08 },
            SlcanFrame::Data {
                id: 0x01C,
                payload: vec![0x01, 0x00, 0x00, 0x00, 0x10, 0x50, 0x00, 0x00],
            },
            SlcanFrame::Data {
                id: 0x020,
                payload: vec![0x01, 0x00, 0x00, 0x00, 0x10, 0x50, 0x00, 0x00],
            },
            SlcanFrame::Other,
            SlcanFrame::Data {
                id: 0x01C,
                payload: vec![0x00, 0x40, 0x00, 0x00, 0x10, 0x50, 0xFF, 0xFF],
            },
        ];
        let events = pipeline.process(Inbound::Frames(frames), 0);
        assert_eq!(measurements(&events), vec![4.0, 1.0]);
        assert_eq!(pipeline.remote_echoes(), 1);
    }

    #[test]
    fn test_remote_echoes_counted_not_emitted() {
        let mut pipeline = MeasurementPipeline::new(0x01C, 512);
        let events = pipeline.process(Inbound::Bytes(b"R008\rr0090\rR009\r".to_vec()), 0);
        assert!(events.is_empty());
        assert_eq!(pipeline.remote_echoes(), 3);
    }

    #[test]
    fn test_overflow_keeps_receive_order() {
        let mut pipeline = MeasurementPipeline::new(0x01C, 24);
        let mut chunk = b"T01C0100000010500000\r".to_vec();
        chunk.extend_from_slice(&[b'A'; 30]);
        chunk.extend_from_slice(b"\rT01C0200000010500000\r");

        let events = pipeline.process(Inbound::Bytes(chunk), 0);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SensorEvent::Measurement(_)));
        assert!(matches!(events[1], SensorEvent::FramingError(IoError::Framing { limit: 24, .. })));
        assert!(matches!(events[2], SensorEvent::Measurement(_)));
    }
}
