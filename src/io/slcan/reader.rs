// src/io/slcan/reader.rs
//
// Serial binding for slcan adapters (RH-02, CANable and other Lawicel-style
// USB-CAN converters).
//
// The port handle is cloned into independent read and write halves. Reads run
// on a dedicated thread that forwards chunks over a bounded channel, so the
// async read loop only ever awaits the channel.

use async_trait::async_trait;
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::io::codec::FrameCodec;
use crate::io::error::IoError;
use crate::io::transport::{CommandWriter, InboundReader, Transport};
use crate::io::types::Inbound;
use crate::settings::SensorConfig;

use super::codec::{SlcanCodec, SlcanCommand};

// ============================================================================
// Constants
// ============================================================================

/// Bytes requested per port read
const READ_CHUNK: usize = 256;

/// Chunks buffered between the pump thread and the read loop
const READ_QUEUE_DEPTH: usize = 64;

/// Pause after a zero-length read
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// USB CDC adapters need a moment after open before accepting commands
const DEVICE_SETTLE: Duration = Duration::from_millis(200);

type ChunkResult = Result<Vec<u8>, IoError>;

// ============================================================================
// Transport
// ============================================================================

/// slcan adapter on a byte stream
pub struct SerialTransport {
    writer: SerialWriter,
    reader: SerialReader,
}

/// Write half; commands are written whole under a lock
pub struct SerialWriter {
    port: Mutex<Box<dyn Write + Send>>,
    device: String,
}

/// Read half; receives chunks from the pump thread
pub struct SerialReader {
    rx: mpsc::Receiver<ChunkResult>,
    device: String,
}

impl SerialTransport {
    /// Build a transport from any read/write pair and start the read pump.
    pub fn from_parts<R, W>(reader: R, writer: W, device: impl Into<String>) -> Result<Self, IoError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let device = device.into();
        let (tx, rx) = mpsc::channel(READ_QUEUE_DEPTH);

        let pump_device = device.clone();
        thread::Builder::new()
            .name("slcan-read".to_string())
            .spawn(move || pump_reads(reader, tx, pump_device))
            .map_err(|e| IoError::connection(&device, format!("spawn read thread: {}", e)))?;

        Ok(SerialTransport {
            writer: SerialWriter {
                port: Mutex::new(Box::new(writer)),
                device: device.clone(),
            },
            reader: SerialReader { rx, device },
        })
    }
}

impl Transport for SerialTransport {
    type Writer = SerialWriter;
    type Reader = SerialReader;

    fn split(self) -> (SerialWriter, SerialReader) {
        (self.writer, self.reader)
    }
}

impl CommandWriter for SerialWriter {
    fn send(&self, command: &SlcanCommand) -> Result<(), IoError> {
        let bytes = SlcanCodec::encode(command)?;
        let mut port = self.port.lock().map_err(|e| {
            IoError::transport(&self.device, format!("port mutex poisoned: {}", e))
        })?;
        port.write_all(&bytes)
            .and_then(|_| port.flush())
            .map_err(|e| IoError::transport(&self.device, format!("Write error: {}", e)))
    }

    fn device(&self) -> &str {
        &self.device
    }
}

#[async_trait]
impl InboundReader for SerialReader {
    async fn next_inbound(&mut self) -> Result<Inbound, IoError> {
        match self.rx.recv().await {
            Some(Ok(bytes)) => Ok(Inbound::Bytes(bytes)),
            Some(Err(e)) => Err(e),
            None => Err(IoError::transport(&self.device, "read thread ended")),
        }
    }
}

/// Blocking read pump.
///
/// Timed-out reads are retried. The first hard read error is forwarded and ends
/// the pump. The pump also ends once the receiving side is dropped.
fn pump_reads<R: Read>(mut port: R, tx: mpsc::Sender<ChunkResult>, device: String) {
    let mut buf = [0u8; READ_CHUNK];

    while !tx.is_closed() {
        match port.read(&mut buf) {
            Ok(n) if n > 0 => {
                if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Ok(_) => thread::sleep(IDLE_BACKOFF),
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
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

// ============================================================================
// Port Access
// ============================================================================

/// Open the configured serial port as an slcan transport.
///
/// The adapter is not initialised here; `SensorController::open` sends the
/// bitrate and open commands. Blocks while the adapter settles; async
/// callers go through `SensorSession::connect_serial`.
pub fn open_serial(config: &SensorConfig) -> Result<SerialTransport, IoError> {
    let device = format!("slcan({})", config.port);

    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(Duration::from_millis(config.read_timeout_ms))
        .open()
        .map_err(|e| IoError::connection(&device, e.to_string()))?;

    // Wait for USB device to be ready, then drop anything it sent meanwhile
    thread::sleep(DEVICE_SETTLE);
    let _ = port.clear(serialport::ClearBuffer::All);

    let reader = port
        .try_clone()
        .map_err(|e| IoError::connection(&device, format!("clone handle: {}", e)))?;

    tlog!(
        "[slcan] Connected to {} (baud: {}, read timeout: {}ms)",
        config.port,
        config.baud_rate,
        config.read_timeout_ms
    );

    SerialTransport::from_parts(reader, port, device)
}

/// A serial port an slcan adapter may be attached to
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdapterPort {
    pub name: String,
    /// "USB", "Bluetooth", "PCI" or "Unknown"
    pub kind: &'static str,
    /// USB vendor and product id
    pub usb_id: Option<(u16, u16)>,
    /// USB product string, falling back to the manufacturer
    pub description: Option<String>,
}

/// List ports that could carry an adapter, sorted by name.
pub fn list_serial_ports() -> Result<Vec<AdapterPort>, IoError> {
    let mut ports: Vec<AdapterPort> = serialport::available_ports()
        .map_err(|e| IoError::configuration(format!("Failed to enumerate ports: {}", e)))?
        .into_iter()
        .filter(|p| is_listed(&p.port_name))
        .map(describe_port)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}

/// macOS exposes each device twice; `/dev/tty.*` blocks on open until DCD.
fn is_listed(name: &str) -> bool {
    !(cfg!(target_os = "macos") && name.starts_with("/dev/tty."))
}

fn describe_port(port: serialport::SerialPortInfo) -> AdapterPort {
    let (kind, usb_id, description) = match port.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            ("USB", Some((usb.vid, usb.pid)), usb.product.or(usb.manufacturer))
        }
        serialport::SerialPortType::BluetoothPort => ("Bluetooth", None, None),
        serialport::SerialPortType::PciPort => ("PCI", None, None),
        serialport::SerialPortType::Unknown => ("Unknown", None, None),
    };
    AdapterPort {
        name: port.port_name,
        kind,
        usb_id,
        description,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[test]
    fn test_describe_non_usb_ports() {
        let port = describe_port(serialport::SerialPortInfo {
            port_name: "/dev/rfcomm0".to_string(),
            port_type: serialport::SerialPortType::BluetoothPort,
        });
        assert_eq!(
            port,
            AdapterPort {
                name: "/dev/rfcomm0".to_string(),
                kind: "Bluetooth",
                usb_id: None,
                description: None,
            }
        );

        let port = describe_port(serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: serialport::SerialPortType::Unknown,
        });
        assert_eq!(port.kind, "Unknown");
    }

    #[test]
    fn test_port_listing_filter() {
        assert!(is_listed("/dev/ttyACM0"));
        assert!(is_listed("/dev/cu.usbmodem1101"));
        assert!(is_listed("COM3"));
        assert_eq!(is_listed("/dev/tty.usbmodem1101"), !cfg!(target_os = "macos"));
    }

    /// Scripted port: hands out queued results, then idles with timeouts
    struct ScriptedPort {
        script: VecDeque<std::io::Result<Vec<u8>>>,
    }

    impl ScriptedPort {
        fn new(script: Vec<std::io::Result<Vec<u8>>>) -> Self {
            ScriptedPort {
                script: script.into(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => {
                    thread::sleep(Duration::from_millis(1));
                    Err(std::io::Error::new(ErrorKind::TimedOut, "idle"))
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reader_delivers_chunks_in_order() {
        let port = ScriptedPort::new(vec![
            Ok(b"T01C01".to_vec()),
            Err(std::io::Error::new(ErrorKind::TimedOut, "timeout")),
            Ok(b"02\r".to_vec()),
        ]);
        let transport = SerialTransport::from_parts(port, SharedSink::default(), "slcan(test)").unwrap();
        let (_writer, mut reader) = transport.split();

        assert_eq!(reader.next_inbound().await.unwrap(), Inbound::Bytes(b"T01C01".to_vec()));
        assert_eq!(reader.next_inbound().await.unwrap(), Inbound::Bytes(b"02\r".to_vec()));
    }

    #[tokio::test]
    async fn test_read_error_is_forwarded_once() {
        let port = ScriptedPort::new(vec![
            Ok(b"z\r".to_vec()),
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "device gone")),
        ]);
        let transport = SerialTransport::from_parts(port, SharedSink::default(), "slcan(test)").unwrap();
        let (_writer, mut reader) = transport.split();

        assert!(reader.next_inbound().await.is_ok());
        let err = reader.next_inbound().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("device gone"));

        // Pump has exited; the channel reports the dead thread
        let err = reader.next_inbound().await.unwrap_err();
        assert!(err.to_string().contains("read thread ended"));
    }

    #[tokio::test]
    async fn test_writer_sends_exact_bytes() {
        let sink = SharedSink::default();
        let transport =
            SerialTransport::from_parts(ScriptedPort::new(vec![]), sink.clone(), "slcan(test)").unwrap();
        let (writer, _reader) = transport.split();

        writer.send(&SlcanCommand::SetBitrate(1_000_000)).unwrap();
        writer.send(&SlcanCommand::Open).unwrap();
        writer.send(&SlcanCommand::Remote(0x08)).unwrap();

        assert_eq!(sink.0.lock().unwrap().as_slice(), b"S8\rO\rR008\r");
        assert_eq!(writer.device(), "slcan(test)");
    }

    #[tokio::test]
    async fn test_write_failure_is_transport_error() {
        let transport =
            SerialTransport::from_parts(ScriptedPort::new(vec![]), BrokenSink, "slcan(test)").unwrap();
        let (writer, _reader) = transport.split();

        let err = writer.send(&SlcanCommand::Open).unwrap_err();
        assert!(matches!(err, IoError::Transport { .. }));
    }
}
