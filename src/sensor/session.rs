// src/sensor/session.rs
//
// SensorSession ties a transport, a controller and a running read loop together.

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::io::slcan::open_serial;
use crate::io::{IoError, SensorEvent, TimedMeasurement, Transport};
use crate::settings::SensorConfig;

use super::controller::SensorController;

/// An open adapter with its read loop running.
///
/// Must be created inside a tokio runtime.
pub struct SensorSession {
    controller: SensorController,
    events: mpsc::Receiver<SensorEvent>,
    reader_task: JoinHandle<()>,
}

impl SensorSession {
    /// Initialise the adapter on `transport` and start the read loop.
    /// Measurements flow once [`SensorSession::start`] is called.
    pub fn open<T: Transport>(config: SensorConfig, transport: T) -> Result<Self, IoError> {
        let capacity = config.event_capacity.max(1);
        let (writer, reader) = transport.split();
        let controller = SensorController::open(config, writer)?;
        let (events_tx, events) = mpsc::channel(capacity);
        let reader_task = controller.spawn_reader(reader, events_tx)?;

        Ok(SensorSession {
            controller,
            events,
            reader_task,
        })
    }

    /// Open the serial port named in `config`.
    ///
    /// Blocks the calling thread while the adapter settles (about 200 ms). From
    /// async code prefer [`SensorSession::connect_serial`].
    pub fn open_serial(config: SensorConfig) -> Result<Self, IoError> {
        let transport = open_serial(&config)?;
        Self::open(config, transport)
    }

    /// Open the serial port on the blocking pool, then start the session.
    pub async fn connect_serial(config: SensorConfig) -> Result<Self, IoError> {
        let port_config = config.clone();
        let transport = tokio::task::spawn_blocking(move || open_serial(&port_config))
            .await
            .map_err(|e| {
                IoError::connection(&format!("slcan({})", config.port), format!("open task failed: {}", e))
            })??;
        Self::open(config, transport)
    }

    /// Open a SocketCAN interface (e.g., "can0"). Bitrate is set by the OS.
    #[cfg(target_os = "linux")]
    pub fn open_socketcan(config: SensorConfig, interface: &str) -> Result<Self, IoError> {
        let timeout = std::time::Duration::from_millis(config.read_timeout_ms);
        let transport = crate::io::socketcan::open_socketcan(interface, timeout)?;
        Self::open(config, transport)
    }

    /// Controller handle; clone it to stop the session from elsewhere.
    pub fn controller(&self) -> &SensorController {
        &self.controller
    }

    pub fn start(&self) -> Result<(), IoError> {
        self.controller.start()
    }

    pub fn stop(&self) -> Result<(), IoError> {
        self.controller.stop()
    }

    /// Next event from the read loop; `None` once the loop is gone.
    pub async fn next_event(&mut self) -> Option<SensorEvent> {
        self.events.recv().await
    }

    /// Measurements only. Ends after a fatal error (yielded as `Err`) or a stop.
    pub fn measurements(&mut self) -> impl Stream<Item = Result<TimedMeasurement, IoError>> + '_ {
        measurement_stream(&mut self.events)
    }

    /// Stop the sensor and wait for the read loop to finish.
    pub async fn close(self) -> Result<(), IoError> {
        let stopped = self.controller.stop();
        // Unblocks a loop waiting on a full event queue
        drop(self.events);
        if let Err(e) = self.reader_task.await {
            tlog!("[sensor] Read task failed: {}", e);
        }
        stopped
    }

    /// Split into the controller, the event receiver and the read task.
    pub fn into_parts(self) -> (SensorController, mpsc::Receiver<SensorEvent>, JoinHandle<()>) {
        (self.controller, self.events, self.reader_task)
    }
}

/// Adapt an event receiver into a stream of measurements.
///
/// Framing errors are skipped (the read loop already logged them). A fatal
/// error is yielded once and ends the stream.
pub fn measurement_stream(
    events: &mut mpsc::Receiver<SensorEvent>,
) -> impl Stream<Item = Result<TimedMeasurement, IoError>> + '_ {
    stream::unfold(Some(events), |events| async move {
        let events = events?;
        loop {
            match events.recv().await? {
                SensorEvent::Measurement(m) => return Some((Ok(m), Some(events))),
                SensorEvent::Fatal(e) => return Some((Err(e), None)),
                event if event.is_terminal() => return None,
                _ => continue,
            }
        }
    })
}
