// src/io/socketcan/codec.rs
//
// SocketCAN frame codec for the Linux kernel CAN interface.
//
// Kernel frames map onto the same classification the slcan parser produces,
// and adapter commands map onto kernel frames. Bitrate and channel-open
// commands have no kernel frame equivalent (the interface is configured by
// the OS) and encode to nothing.

use socketcan::{CanFrame, EmbeddedFrame, Id, StandardId};

use crate::io::codec::FrameCodec;
use crate::io::error::IoError;
use crate::io::slcan::codec::{SlcanCommand, SlcanFrame, MAX_STD_ID};

/// SocketCAN frame codec (classic CAN, standard identifiers).
pub struct SocketCanCodec;

impl FrameCodec for SocketCanCodec {
    type RawFrame = CanFrame;
    /// `None` when the command is a no-op on SocketCAN
    type EncodedFrame = Option<CanFrame>;

    fn decode(frame: &CanFrame) -> Result<SlcanFrame, IoError> {
        let standard_id = |id: Id| match id {
            Id::Standard(sid) => Some(sid.as_raw() as u32),
            Id::Extended(_) => None,
        };

        Ok(match frame {
            CanFrame::Data(f) => match standard_id(f.id()) {
                Some(id) => SlcanFrame::Data {
                    id,
                    payload: f.data().to_vec(),
                },
                None => SlcanFrame::Other,
            },
            CanFrame::Remote(f) => match standard_id(f.id()) {
                Some(id) => SlcanFrame::Remote { id },
                None => SlcanFrame::Other,
            },
            CanFrame::Error(_) => SlcanFrame::Other,
        })
    }

    fn encode(command: &SlcanCommand) -> Result<Option<CanFrame>, IoError> {
        match *command {
            SlcanCommand::SetBitrate(_) | SlcanCommand::Open => Ok(None),
            SlcanCommand::Remote(id) => {
                if id > MAX_STD_ID {
                    return Err(IoError::protocol(
                        "socketcan",
                        format!("remote frame id 0x{:X} exceeds 11 bits", id),
                    ));
                }
                let sid = StandardId::new(id as u16).ok_or_else(|| {
                    IoError::protocol("socketcan", format!("Invalid standard ID: 0x{:03X}", id))
                })?;
                let frame = CanFrame::new_remote(sid, 0).ok_or_else(|| {
                    IoError::protocol("socketcan", "Failed to create remote frame")
                })?;
                Ok(Some(frame))
            }
        }
    }
}
