// src/io/slcan/mod.rs
//
// slcan (Serial Line CAN) protocol driver for Lawicel-style USB-CAN adapters.
//
// Protocol reference: http://www.can232.com/docs/can232_v3.pdf

pub mod codec;
pub mod framer;
pub mod reader;

// Re-export public items
// Note: SlcanCodec is also available via io::codec::SlcanCodec
pub use codec::{find_bitrate_command, parse_line, SlcanCommand, SlcanFrame};
pub use framer::{FramerEvent, LineFramer, DEFAULT_MAX_LINE_LEN};
pub use reader::{list_serial_ports, open_serial, AdapterPort, SerialTransport};
