// src/sensor/controller.rs
//
// Sensor controller: adapter init, start/stop remote frames and the read loop.
//
// Commands go through one mutex-guarded writer so start/stop from different
// threads never interleave on the wire. The read loop runs as a tokio task and
// watches a stop signal; a chunk that was already taken is fully processed
// before the loop exits. The task holds no controller handle, so dropping the
// last controller closes the stop channel and ends the loop.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::io::slcan::SlcanCommand;
use crate::io::{now_us, CommandWriter, InboundReader, IoError, SensorEvent};
use crate::settings::SensorConfig;

use super::pipeline::MeasurementPipeline;

/// Session lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorState {
    /// Adapter opened, measurements not requested
    Idle,
    Reading,
    /// Terminal
    Stopped,
}

type SharedState = Arc<Mutex<SensorState>>;

/// Handle to one sensor session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SensorController {
    inner: Arc<Inner>,
}

struct Inner {
    config: SensorConfig,
    device: String,
    writer: Mutex<Box<dyn CommandWriter>>,
    state: SharedState,
    stop_tx: watch::Sender<bool>,
}

/// What the read task owns
struct ReadLoop {
    device: String,
    pipeline: MeasurementPipeline,
    state: SharedState,
    stop_rx: watch::Receiver<bool>,
}

impl SensorController {
    /// Initialise the adapter (bitrate, open channel) and return an idle controller.
    pub fn open<W>(config: SensorConfig, writer: W) -> Result<Self, IoError>
    where
        W: CommandWriter + 'static,
    {
        config.validate()?;

        let device = writer.device().to_string();
        writer.send(&SlcanCommand::SetBitrate(config.bitrate))?;
        writer.send(&SlcanCommand::Open)?;

        tlog!(
            "[sensor] {} open at {} bit/s, sensor id 0x{:03X}",
            device,
            config.bitrate,
            config.sensor_id
        );

        let (stop_tx, _) = watch::channel(false);
        Ok(SensorController {
            inner: Arc::new(Inner {
                config,
                device,
                writer: Mutex::new(Box::new(writer)),
                state: Arc::new(Mutex::new(SensorState::Idle)),
                stop_tx,
            }),
        })
    }

    pub fn config(&self) -> &SensorConfig {
        &self.inner.config
    }

    pub fn device(&self) -> &str {
        &self.inner.device
    }

    pub fn state(&self) -> SensorState {
        self.inner
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(SensorState::Stopped)
    }

    /// Request measurements from the sensor.
    pub fn start(&self) -> Result<(), IoError> {
        let writer = self.lock_writer()?;
        if self.state() == SensorState::Stopped {
            return Err(IoError::SessionStopped);
        }
        writer.send(&SlcanCommand::Remote(self.inner.config.start_id))?;
        advance_state(&self.inner.state, SensorState::Reading);
        tlog!("[sensor] Start requested (0x{:03X})", self.inner.config.start_id);
        Ok(())
    }

    /// Ask the sensor to stop and end the read loop. No-op once stopped.
    ///
    /// The loop is signalled even if the stop frame cannot be written.
    pub fn stop(&self) -> Result<(), IoError> {
        let writer = self.lock_writer()?;
        if self.state() == SensorState::Stopped {
            return Ok(());
        }
        let result = writer.send(&SlcanCommand::Remote(self.inner.config.stop_id));
        advance_state(&self.inner.state, SensorState::Stopped);
        self.inner.stop_tx.send_replace(true);
        tlog!("[sensor] Stop requested (0x{:03X})", self.inner.config.stop_id);
        result
    }

    /// Launch the read loop. Events are delivered to `events` in receive order.
    ///
    /// The loop ends on `stop()`, on a fatal read error, when `events` is
    /// closed, or when every controller clone has been dropped.
    pub fn spawn_reader<R>(
        &self,
        reader: R,
        events: mpsc::Sender<SensorEvent>,
    ) -> Result<JoinHandle<()>, IoError>
    where
        R: InboundReader + 'static,
    {
        if self.state() == SensorState::Stopped {
            return Err(IoError::SessionStopped);
        }
        advance_state(&self.inner.state, SensorState::Reading);

        let config = &self.inner.config;
        let read_loop = ReadLoop {
            device: self.inner.device.clone(),
            pipeline: MeasurementPipeline::new(config.sensor_id, config.max_line_len),
            state: self.inner.state.clone(),
            stop_rx: self.inner.stop_tx.subscribe(),
        };
        Ok(tokio::spawn(read_loop.run(reader, events)))
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn CommandWriter>>, IoError> {
        self.inner
            .writer
            .lock()
            .map_err(|_| IoError::transport(&self.inner.device, "command lock poisoned"))
    }
}

impl ReadLoop {
    async fn run<R: InboundReader>(mut self, mut reader: R, events: mpsc::Sender<SensorEvent>) {
        tlog!("[sensor] Read loop started on {}", self.device);

        let reason = loop {
            let stopped = *self.stop_rx.borrow();
            if stopped {
                break "stopped".to_string();
            }

            let inbound = tokio::select! {
                biased;
                changed = self.stop_rx.changed() => {
                    if changed.is_err() {
                        break "controller dropped".to_string();
                    }
                    continue;
                }
                result = reader.next_inbound() => result,
            };

            match inbound {
                Ok(inbound) => {
                    // A stop that lands while this chunk is processed still lets
                    // every measurement in it through
                    for event in self.pipeline.process(inbound, now_us()) {
                        if events.send(event).await.is_err() {
                            tlog!("[sensor] Consumer dropped, ending read loop");
                            return;
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    tlog!("[sensor] Read error on {}: {}", self.device, e);
                    advance_state(&self.state, SensorState::Stopped);
                    let _ = events.send(SensorEvent::Fatal(e)).await;
                    return;
                }
                Err(e) => {
                    tlog!("[sensor] Skipping bad input on {}: {}", self.device, e);
                    if events.send(SensorEvent::FramingError(e)).await.is_err() {
                        return;
                    }
                }
            }
        };

        // Partial lines die with the loop
        self.pipeline.reset();
        advance_state(&self.state, SensorState::Stopped);
        tlog!(
            "[sensor] Read loop ended: {} ({} remote echoes ignored)",
            reason,
            self.pipeline.remote_echoes()
        );
        let _ = events.send(SensorEvent::Ended(reason)).await;
    }
}

/// Move to `next` unless the session already reached `Stopped`
fn advance_state(state: &Mutex<SensorState>, next: SensorState) {
    if let Ok(mut current) = state.lock() {
        if *current != SensorState::Stopped {
            *current = next;
        }
    }
}
