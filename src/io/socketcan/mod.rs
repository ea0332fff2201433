// src/io/socketcan/mod.rs
//
// SocketCAN driver for Linux native CAN interfaces: the message-adapter
// binding of the transport interface. Frames arrive whole, so the slcan line
// framer is bypassed.
//
// Requires the interface to be configured first:
//   sudo ip link set can0 up type can bitrate 1000000
//
// Only compiled on Linux.

pub mod codec;
pub mod reader;

pub use codec::SocketCanCodec;
pub use reader::{open_socketcan, SocketCanTransport};
