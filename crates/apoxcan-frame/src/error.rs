/// Errors that can occur while writing frames or handling the frame stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream accepted no more bytes before the frame was fully written.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// A framing violation seen by [`FrameReader`](crate::FrameReader).
///
/// None of these stop the stream: the reader drops the current frame and
/// waits for the next `DLE` to resynchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A byte other than `DLE` arrived between frames.
    #[error("expecting a DLE byte, dropping byte 0x{0:02X}")]
    ExpectDle(u8),

    /// The start `DLE` was not followed by `STX`.
    #[error("expecting a STX byte, dropping byte 0x{0:02X}")]
    ExpectStx(u8),

    /// An escape inside the payload was followed by `STX`.
    #[error("expecting a ETX byte or content byte, dropping byte 0x{0:02X}")]
    ExpectEtx(u8),

    /// The frame terminated with a non-zero running checksum.
    #[error("bad frame checksum (residue 0x{0:02X})")]
    BadChecksum(u8),

    /// The payload reached the configured maximum before the terminator.
    #[error("not enough space in frame buffer ({max} bytes), dropping byte 0x{byte:02X}")]
    Overflow { byte: u8, max: usize },
}

impl ProtocolError {
    /// The offending byte, when the error was raised by a specific byte.
    pub fn byte(&self) -> Option<u8> {
        match *self {
            Self::ExpectDle(byte) | Self::ExpectStx(byte) | Self::ExpectEtx(byte) => Some(byte),
            Self::Overflow { byte, .. } => Some(byte),
            Self::BadChecksum(_) => None,
        }
    }
}
