// src/io/slcan/codec.rs
//
// slcan (Serial Line CAN) ASCII protocol codec.
//
// Protocol reference: http://www.can232.com/docs/can232_v3.pdf
//
// Inbound line formats (terminator already stripped by the framer):
//   Compact data: T<ID:3hex><DATA:2hex*n>        n = 0..8, no DLC digit
//   Standard:     t<ID:3hex><DLC:1hex><DATA:2hex*DLC>
//   Remote:       R<ID:3hex> / r<ID:3hex><DLC:1hex>
//
// Outbound commands:
//   S<n>\r  bitrate select, O\r  open channel, R<ID:3hex>\r  remote frame

use crate::io::codec::FrameCodec;
use crate::io::error::IoError;

// ============================================================================
// Constants
// ============================================================================

/// Line terminator used in both directions
pub const SLCAN_TERMINATOR: u8 = b'\r';

/// Bell byte sent by adapters in place of an error response
const SLCAN_BELL: u8 = 0x07;

/// Hex digits in a standard (11-bit) identifier
const STD_ID_DIGITS: usize = 3;

/// Largest standard CAN identifier
pub const MAX_STD_ID: u32 = 0x7FF;

/// Classic CAN payload limit
pub const MAX_PAYLOAD: usize = 8;

/// slcan bitrate commands (S0-S8)
const SLCAN_BITRATES: [(u32, &str); 9] = [
    (10_000, "S0"),    // 10 Kbit/s
    (20_000, "S1"),    // 20 Kbit/s
    (50_000, "S2"),    // 50 Kbit/s
    (100_000, "S3"),   // 100 Kbit/s
    (125_000, "S4"),   // 125 Kbit/s
    (250_000, "S5"),   // 250 Kbit/s
    (500_000, "S6"),   // 500 Kbit/s
    (800_000, "S7"),   // 800 Kbit/s
    (1_000_000, "S8"), // 1 Mbit/s
];

// ============================================================================
// Types
// ============================================================================

/// A classified inbound frame.
///
/// The serial binding produces these from SLCAN lines; the SocketCAN binding
/// produces them directly from kernel frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlcanFrame {
    /// Data frame with an 11-bit identifier and up to 8 payload bytes
    Data { id: u32, payload: Vec<u8> },
    /// Remote (data request) frame, usually the adapter echoing our own command
    Remote { id: u32 },
    /// Command acknowledgement, status line, or anything unparseable
    Other,
}

/// Outbound adapter command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlcanCommand {
    /// Select the CAN bus bitrate in bits/second
    SetBitrate(u32),
    /// Open the CAN channel
    Open,
    /// Remote frame addressed to a standard identifier
    Remote(u32),
}

/// slcan (Serial Line CAN) ASCII protocol codec.
pub struct SlcanCodec;

impl FrameCodec for SlcanCodec {
    /// Raw frame is one line without its trailing \r
    type RawFrame = [u8];
    /// Encoded frame is the ASCII command including its trailing \r
    type EncodedFrame = Vec<u8>;

    /// Decode an slcan line, reporting why a tagged line is malformed.
    ///
    /// Untagged lines (acks, version replies, empty lines) are `Ok(Other)`.
    fn decode(line: &[u8]) -> Result<SlcanFrame, IoError> {
        let line = skip_noise(line);
        let Some((&tag, body)) = line.split_first() else {
            return Ok(SlcanFrame::Other);
        };

        match tag {
            b'T' => decode_compact_data(body),
            b't' => decode_standard_data(body),
            b'R' | b'r' => decode_remote(body),
            _ => Ok(SlcanFrame::Other),
        }
    }

    /// Encode an outbound command to its exact slcan bytes.
    fn encode(command: &SlcanCommand) -> Result<Vec<u8>, IoError> {
        let mut cmd = String::with_capacity(8);
        match *command {
            SlcanCommand::SetBitrate(bitrate) => cmd.push_str(find_bitrate_command(bitrate)?),
            SlcanCommand::Open => cmd.push('O'),
            SlcanCommand::Remote(id) => {
                if id > MAX_STD_ID {
                    return Err(IoError::protocol(
                        "slcan",
                        format!("remote frame id 0x{:X} exceeds 11 bits", id),
                    ));
                }
                cmd.push('R');
                cmd.push_str(&format!("{:03X}", id));
            }
        }
        cmd.push(SLCAN_TERMINATOR as char);
        Ok(cmd.into_bytes())
    }
}

// ============================================================================
// Line Parsing
// ============================================================================

/// Parse a single slcan line, never failing.
///
/// Malformed lines come back as `SlcanFrame::Other` so a noisy adapter cannot
/// abort the read loop.
pub fn parse_line(line: &[u8]) -> SlcanFrame {
    SlcanCodec::decode(line).unwrap_or(SlcanFrame::Other)
}

/// Find the slcan bitrate command for a given bitrate
pub fn find_bitrate_command(bitrate: u32) -> Result<&'static str, IoError> {
    SLCAN_BITRATES
        .iter()
        .find(|(rate, _)| *rate == bitrate)
        .map(|(_, cmd)| *cmd)
        .ok_or_else(|| {
            let valid: Vec<String> = SLCAN_BITRATES.iter().map(|(r, _)| format!("{}", r)).collect();
            IoError::configuration(format!(
                "Invalid CAN bitrate {}. Valid bitrates: {}",
                bitrate,
                valid.join(", ")
            ))
        })
}

/// Drop leading LF and BEL bytes left over from CRLF adapters or error replies
fn skip_noise(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|&b| b != b'\n' && b != SLCAN_BELL)
        .unwrap_or(line.len());
    &line[start..]
}

fn parse_id(digits: &[u8]) -> Result<u32, IoError> {
    if digits.len() < STD_ID_DIGITS {
        return Err(IoError::malformed(format!(
            "identifier too short: {} digits",
            digits.len()
        )));
    }
    digits[..STD_ID_DIGITS]
        .iter()
        .try_fold(0u32, |acc, &c| (c as char).to_digit(16).map(|d| (acc << 4) | d))
        .ok_or_else(|| {
            IoError::malformed(format!(
                "non-hex identifier: {}",
                String::from_utf8_lossy(&digits[..STD_ID_DIGITS])
            ))
        })
}

fn parse_payload(hex_chars: &[u8]) -> Result<Vec<u8>, IoError> {
    // A dangling final nibble is dropped rather than rejected
    let even = &hex_chars[..hex_chars.len() & !1];
    if even.len() / 2 > MAX_PAYLOAD {
        return Err(IoError::malformed(format!(
            "payload too long: {} bytes",
            even.len() / 2
        )));
    }
    hex::decode(even).map_err(|e| IoError::malformed(format!("payload: {}", e)))
}

/// `T` + 3 hex id + byte pairs, no DLC digit
fn decode_compact_data(body: &[u8]) -> Result<SlcanFrame, IoError> {
    let id = parse_id(body)?;
    let payload = parse_payload(&body[STD_ID_DIGITS..])?;
    Ok(SlcanFrame::Data { id, payload })
}

/// `t` + 3 hex id + DLC + exactly DLC byte pairs (extra trailing chars, e.g. timestamps, ignored)
fn decode_standard_data(body: &[u8]) -> Result<SlcanFrame, IoError> {
    let id = parse_id(body)?;
    let dlc = body
        .get(STD_ID_DIGITS)
        .and_then(|&c| (c as char).to_digit(16))
        .ok_or_else(|| IoError::malformed("missing or invalid DLC"))? as usize;

    if dlc > MAX_PAYLOAD {
        return Err(IoError::malformed(format!("invalid DLC: {} (max 8)", dlc)));
    }

    let data_start = STD_ID_DIGITS + 1;
    let data_end = data_start + dlc * 2;
    if body.len() < data_end {
        return Err(IoError::malformed(format!(
            "incomplete data: {} hex chars, need {}",
            body.len() - data_start,
            dlc * 2
        )));
    }

    let payload = parse_payload(&body[data_start..data_end])?;
    Ok(SlcanFrame::Data { id, payload })
}

fn decode_remote(body: &[u8]) -> Result<SlcanFrame, IoError> {
    let id = parse_id(body)?;
    Ok(SlcanFrame::Remote { id })
}

// ============================================================================
// Tests
// ============================================================================
