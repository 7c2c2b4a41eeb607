//! DLE/STX/ETX byte-stuffed framing for the Apox USB-CAN adapter.
//!
//! Every frame on the wire, in both directions, looks like:
//! - `DLE STX` start marker
//! - the payload, with every literal `DLE` doubled
//! - a one-byte XOR checksum, escaped the same way
//! - `DLE ETX` end marker
//!
//! [`FrameReader`] is the byte-at-a-time decoder that resynchronizes on the
//! next `DLE` after any error. [`FrameWriter`] builds a complete frame in a
//! bounded scratch buffer and writes it in one go.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::StuffedCodec;
pub use codec::{
    checksum, decode_frame, encode_frame, max_encoded_len, Frame, FrameConfig, FrameKind,
    DEFAULT_MAX_OUTBOUND_PAYLOAD, DEFAULT_MAX_PAYLOAD, DLE, ETX, NOISE, STX,
};
pub use error::{FrameError, ProtocolError, Result};
pub use reader::{Feed, FrameReader, ReaderState};
pub use writer::FrameWriter;
