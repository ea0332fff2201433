// src/io/transport.rs
//
// Transport capability interface.
//
// A transport splits into a command writer (shared by whoever issues start/stop)
// and an inbound reader (owned by the single read task). The serial binding
// delivers raw byte chunks; the SocketCAN binding delivers whole frames.

use async_trait::async_trait;

use super::error::IoError;
use super::slcan::codec::SlcanCommand;
use super::types::Inbound;

/// Outbound half of a transport
pub trait CommandWriter: Send + Sync {
    /// Send one adapter command. Fire-and-forget: no acknowledgement is awaited.
    fn send(&self, command: &SlcanCommand) -> Result<(), IoError>;

    /// Device label used in logs and errors (e.g., "slcan(/dev/ttyACM0)")
    fn device(&self) -> &str;
}

/// Inbound half of a transport
#[async_trait]
pub trait InboundReader: Send {
    /// Wait for the next chunk of input.
    ///
    /// Must be cancel-safe: the read loop drops this future when a stop
    /// request wins the race.
    async fn next_inbound(&mut self) -> Result<Inbound, IoError>;
}

/// A bidirectional adapter connection
pub trait Transport {
    type Writer: CommandWriter + 'static;
    type Reader: InboundReader + 'static;

    fn split(self) -> (Self::Writer, Self::Reader);
}
