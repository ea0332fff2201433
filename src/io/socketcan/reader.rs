// src/io/socketcan/reader.rs
//
// SocketCAN transport. One socket is shared between the writer and a blocking
// read thread; frames are forwarded to the read loop as they arrive.

use async_trait::async_trait;
use socketcan::{CanSocket, Socket};
use std::io::ErrorKind;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::io::codec::FrameCodec;
use crate::io::error::IoError;
use crate::io::slcan::codec::{SlcanCommand, SlcanFrame};
use crate::io::transport::{CommandWriter, InboundReader, Transport};
use crate::io::types::Inbound;

use super::codec::SocketCanCodec;

/// Frames buffered between the read thread and the read loop
const READ_QUEUE_DEPTH: usize = 64;

type FrameResult = Result<SlcanFrame, IoError>;

pub struct SocketCanTransport {
    writer: SocketCanWriter,
    reader: SocketCanReader,
}

pub struct SocketCanWriter {
    socket: Arc<CanSocket>,
    device: String,
}

pub struct SocketCanReader {
    rx: mpsc::Receiver<FrameResult>,
    device: String,
    /// Read error received while draining a burst, reported on the next call
    deferred: Option<IoError>,
}

/// Open a SocketCAN interface (e.g., "can0") as a transport.
pub fn open_socketcan(interface: &str, read_timeout: Duration) -> Result<SocketCanTransport, IoError> {
    let device = format!("socketcan({})", interface);

    let socket = CanSocket::open(interface).map_err(|e| IoError::connection(&device, e.to_string()))?;

    // Timed reads let the thread notice a dropped reader
    if let Err(e) = socket.set_read_timeout(read_timeout) {
        tlog!("[socketcan] Warning: could not set read timeout: {}", e);
    }

    let socket = Arc::new(socket);
    let (tx, rx) = mpsc::channel(READ_QUEUE_DEPTH);

    let pump_socket = socket.clone();
    let pump_device = device.clone();
    thread::Builder::new()
        .name("socketcan-read".to_string())
        .spawn(move || pump_frames(pump_socket, tx, pump_device))
        .map_err(|e| IoError::connection(&device, format!("spawn read thread: {}", e)))?;

    tlog!("[socketcan] Connected to {}", interface);

    Ok(SocketCanTransport {
        writer: SocketCanWriter {
            socket,
            device: device.clone(),
        },
        reader: SocketCanReader {
            rx,
            device,
            deferred: None,
        },
    })
}

fn pump_frames(socket: Arc<CanSocket>, tx: mpsc::Sender<FrameResult>, device: String) {
    while !tx.is_closed() {
        match socket.read_frame() {
            Ok(frame) => {
                let frame = SocketCanCodec::decode(&frame).unwrap_or(SlcanFrame::Other);
                if tx.blocking_send(Ok(frame)).is_err() {
                    return;
                }
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                let _ = tx.blocking_send(Err(IoError::transport(
                    &device,
                    format!("Read error: {}", e),
                )));
                return;
            }
        }
    }
}

impl Transport for SocketCanTransport {
    type Writer = SocketCanWriter;
    type Reader = SocketCanReader;

    fn split(self) -> (SocketCanWriter, SocketCanReader) {
        (self.writer, self.reader)
    }
}

impl CommandWriter for SocketCanWriter {
    fn send(&self, command: &SlcanCommand) -> Result<(), IoError> {
        match SocketCanCodec::encode(command)? {
            Some(frame) => self
                .socket
                .write_frame(&frame)
                .map_err(|e| IoError::transport(&self.device, format!("Write error: {}", e))),
            None => Ok(()),
        }
    }

    fn device(&self) -> &str {
        &self.device
    }
}

#[async_trait]
impl InboundReader for SocketCanReader {
    async fn next_inbound(&mut self) -> Result<Inbound, IoError> {
        if let Some(e) = self.deferred.take() {
            return Err(e);
        }

        let first = match self.rx.recv().await {
            Some(result) => result?,
            None => return Err(IoError::transport(&self.device, "read thread ended")),
        };

        // Drain whatever else already arrived so a burst is handled as one chunk
        let mut frames = vec![first];
        while let Ok(result) = self.rx.try_recv() {
            match result {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    self.deferred = Some(e);
                    break;
                }
            }
        }
        Ok(Inbound::Frames(frames))
    }
}
