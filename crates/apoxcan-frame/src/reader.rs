use bytes::BytesMut;
use tracing::trace;

use crate::codec::{Frame, FrameConfig, DLE, ETX, NOISE, STX};
use crate::error::ProtocolError;

/// Initial payload buffer capacity; grows up to the configured maximum.
const INITIAL_BUFFER_CAPACITY: usize = 512;

/// Where the reader is within the `DLE STX … DLE ETX` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Between frames, waiting for `DLE`.
    Idle,
    /// Saw the opening `DLE`, waiting for `STX`.
    GotDle,
    /// Accumulating payload bytes.
    InPayload,
    /// Saw `DLE` inside the payload: either an escaped `DLE` or the terminator.
    PayloadEscape,
    /// A frame was just completed.
    Complete,
    /// The last byte raised a protocol error. Waits for `DLE` like `Idle`.
    Error(ProtocolError),
}

/// Outcome of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// Nothing to report yet.
    Pending,
    /// The byte completed a checksum-valid frame.
    Frame(Frame),
    /// The byte raised a protocol error; the reader resynchronizes on the next `DLE`.
    Error(ProtocolError),
}

/// Incremental decoder for the adapter's byte-stuffed frames.
///
/// Bytes are fed one at a time in arrival order. The reader never stops on a
/// bad frame: after an error it drops the partial payload and starts over at
/// the next `DLE`. A `0xFF` outside a frame is treated as line noise and
/// ignored without an error.
#[derive(Debug)]
pub struct FrameReader {
    state: ReaderState,
    buf: BytesMut,
    checksum: u8,
    max_payload: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create a reader with the default maximum payload size.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a reader from a frame configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self::with_max_payload(config.max_payload_size)
    }

    /// Create a reader accepting de-stuffed payloads of up to `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            state: ReaderState::Idle,
            // One extra byte for the trailing checksum.
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY.min(max_payload + 1)),
            checksum: 0,
            max_payload,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Maximum accepted payload size.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Drop any partial frame and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = ReaderState::Idle;
        self.buf.clear();
        self.checksum = 0;
    }

    /// Feed one byte.
    pub fn feed(&mut self, byte: u8) -> Feed {
        match self.state {
            ReaderState::Idle | ReaderState::Complete | ReaderState::Error(_) => {
                if byte == DLE {
                    if matches!(self.state, ReaderState::Error(_)) {
                        trace!("resynchronizing on DLE");
                    }
                    self.buf.clear();
                    self.checksum = 0;
                    self.state = ReaderState::GotDle;
                    Feed::Pending
                } else if byte == NOISE {
                    Feed::Pending
                } else {
                    self.fail(ProtocolError::ExpectDle(byte))
                }
            }
            ReaderState::GotDle => {
                if byte == STX {
                    self.state = ReaderState::InPayload;
                    Feed::Pending
                } else {
                    self.fail(ProtocolError::ExpectStx(byte))
                }
            }
            ReaderState::InPayload => {
                if byte == DLE {
                    self.state = ReaderState::PayloadEscape;
                    Feed::Pending
                } else {
                    self.push(byte)
                }
            }
            ReaderState::PayloadEscape => match byte {
                ETX => self.finish(),
                STX => self.fail(ProtocolError::ExpectEtx(byte)),
                _ => {
                    self.state = ReaderState::InPayload;
                    self.push(byte)
                }
            },
        }
    }

    /// Feed a chunk of bytes in order, returning every frame and error it produced.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<Feed> {
        bytes
            .iter()
            .map(|&byte| self.feed(byte))
            .filter(|outcome| !matches!(outcome, Feed::Pending))
            .collect()
    }

    fn push(&mut self, byte: u8) -> Feed {
        if self.buf.len() > self.max_payload {
            return self.fail(ProtocolError::Overflow {
                byte,
                max: self.max_payload,
            });
        }
        self.buf.extend_from_slice(&[byte]);
        self.checksum ^= byte;
        Feed::Pending
    }

    fn finish(&mut self) -> Feed {
        if self.checksum != 0 {
            return self.fail(ProtocolError::BadChecksum(self.checksum));
        }

        // The checksum byte was folded into the buffer like any payload byte.
        let len = self.buf.len().saturating_sub(1);
        self.buf.truncate(len);
        let payload = self.buf.split().freeze();
        self.checksum = 0;
        self.state = ReaderState::Complete;
        Feed::Frame(Frame { payload })
    }

    fn fail(&mut self, err: ProtocolError) -> Feed {
        self.buf.clear();
        self.checksum = 0;
        self.state = ReaderState::Error(err);
        Feed::Error(err)
    }
}
