// src/io/codec.rs
//
// Unified frame codec trait and re-exports of the binding-specific implementations.
//
// Each binding's codec lives in its driver module:
// - slcan/codec.rs - slcan ASCII lines
// - socketcan/codec.rs - Linux SocketCAN kernel frames
//
// Both decode into the same `SlcanFrame` classification and encode the same
// `SlcanCommand` set, which keeps the sensor controller binding-agnostic.

use crate::io::error::IoError;
use crate::io::slcan::codec::{SlcanCommand, SlcanFrame};

// ============================================================================
// Frame Codec Trait
// ============================================================================

/// Trait for CAN frame codecs.
///
/// The associated types define the binding-specific raw frame formats.
pub trait FrameCodec {
    /// The raw inbound frame type (e.g., ASCII line, kernel frame)
    type RawFrame: ?Sized;

    /// The encoded outbound command type
    type EncodedFrame;

    /// Classify a raw inbound frame.
    ///
    /// Returns `Err(IoError)` when the frame is tagged as data but malformed.
    fn decode(raw: &Self::RawFrame) -> Result<SlcanFrame, IoError>;

    /// Encode an outbound command for the binding.
    fn encode(command: &SlcanCommand) -> Result<Self::EncodedFrame, IoError>;
}

// ============================================================================
// Re-exports from driver modules
// ============================================================================

pub use super::slcan::codec::SlcanCodec;

#[cfg(target_os = "linux")]
pub use super::socketcan::codec::SocketCanCodec;
