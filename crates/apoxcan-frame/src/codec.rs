use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::reader::{Feed, FrameReader};

/// Data link escape. Starts and ends every frame; doubled inside payloads.
pub const DLE: u8 = 0x10;

/// Start of text, follows the opening `DLE`.
pub const STX: u8 = 0x02;

/// End of text, follows the closing `DLE`.
pub const ETX: u8 = 0x03;

/// Byte the adapter emits between frames after a reset or a switch to main
/// code. Ignored between frames without raising an error.
pub const NOISE: u8 = 0xFF;

/// Default maximum de-stuffed payload size accepted by the reader: 32 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 32 * 1024;

/// Default maximum outbound payload size. Covers board commands, CAN-bus
/// messages and 66-byte firmware blocks.
pub const DEFAULT_MAX_OUTBOUND_PAYLOAD: usize = 256;

/// Frame envelope overhead without escapes: `DLE STX` + checksum + `DLE ETX`.
const ENVELOPE_SIZE: usize = 5;

/// A checksum-validated, de-stuffed frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The de-stuffed payload, without the checksum byte.
    pub payload: Bytes,
}

/// What a frame carries, selected by its first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `0x00` (command response) or `0xFF` (emergency) from the adapter firmware.
    Board,
    /// Anything else: a message from the CAN bus.
    CanBus,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The message kind, or `None` for an empty payload.
    pub fn kind(&self) -> Option<FrameKind> {
        match self.payload.first()? {
            0x00 | 0xFF => Some(FrameKind::Board),
            _ => Some(FrameKind::CanBus),
        }
    }

    /// The exact wire size of this frame once stuffed.
    pub fn wire_size(&self) -> usize {
        let escapes = self.payload.iter().filter(|&&b| b == DLE).count();
        let checksum_escape = usize::from(checksum(&self.payload) == DLE);
        ENVELOPE_SIZE + self.payload.len() + escapes + checksum_escape
    }
}

/// XOR of all payload bytes.
///
/// Appending this byte to the payload makes the XOR of the whole frame zero,
/// which is what the reader checks at the terminator.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}

/// Worst-case wire size for a payload of `payload_len` bytes (every byte escaped).
pub fn max_encoded_len(payload_len: usize) -> usize {
    2 * (payload_len + 1) + 4
}

/// Encode a payload into the wire format, appending to `dst`.
///
/// Wire format:
/// ```text
/// ┌─────┬─────┬──────────────────┬───────────┬─────┬─────┐
/// │ DLE │ STX │ payload          │ checksum  │ DLE │ ETX │
/// │0x10 │0x02 │ (DLE → DLE DLE)  │ (escaped) │0x10 │0x03 │
/// └─────┴─────┴──────────────────┴───────────┴─────┴─────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(max_encoded_len(payload.len()));
    dst.put_u8(DLE);
    dst.put_u8(STX);

    let mut sum = 0u8;
    for &byte in payload {
        sum ^= byte;
        put_escaped(dst, byte);
    }
    put_escaped(dst, sum);

    dst.put_u8(DLE);
    dst.put_u8(ETX);
}

fn put_escaped(dst: &mut BytesMut, byte: u8) {
    if byte == DLE {
        dst.put_u8(DLE);
    }
    dst.put_u8(byte);
}

/// Decode the first frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet, in
/// which case nothing is consumed. Otherwise consumes the bytes up to and
/// including the byte that completed the frame or raised the error.
pub fn decode_frame(
    src: &mut BytesMut,
    max_payload: usize,
) -> std::result::Result<Option<Frame>, ProtocolError> {
    let mut reader = FrameReader::with_max_payload(max_payload);

    for (index, &byte) in src.iter().enumerate() {
        match reader.feed(byte) {
            Feed::Pending => {}
            Feed::Frame(frame) => {
                src.advance(index + 1);
                return Ok(Some(frame));
            }
            Feed::Error(err) => {
                src.advance(index + 1);
                return Err(err);
            }
        }
    }

    Ok(None)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum inbound de-stuffed payload size in bytes. Default: 32 KiB.
    pub max_payload_size: usize,
    /// Maximum outbound payload size in bytes; sizes the writer scratch buffer.
    pub max_outbound_payload: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_outbound_payload: DEFAULT_MAX_OUTBOUND_PAYLOAD,
        }
    }
}
