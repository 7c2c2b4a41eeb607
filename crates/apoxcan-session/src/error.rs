use std::time::Duration;

/// Errors decoding an inbound payload or validating an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The frame is shorter than the fixed header of its message kind.
    #[error("{kind} frame too short ({len} bytes, need at least {min})")]
    Truncated {
        kind: &'static str,
        len: usize,
        min: usize,
    },

    /// Outbound CAN-bus data is longer than a CAN frame allows.
    #[error("too much data ({len} bytes), maximum 8 bytes")]
    DataTooLong { len: usize },

    /// Board command codes are 7 bits.
    #[error("board command 0x{0:02X} out of range (max 0x7F)")]
    InvalidCommand(u8),

    /// The identifier does not fit the selected identifier format.
    #[error("CAN id 0x{id:X} out of range for {} identifier", id_format(.extended))]
    InvalidId { id: u32, extended: bool },
}

fn id_format(extended: &bool) -> &'static str {
    if *extended {
        "extended"
    } else {
        "standard"
    }
}

/// Errors parsing a firmware image.
#[derive(Debug, thiserror::Error)]
pub enum FirmwareError {
    /// A record could not be parsed.
    #[error("line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    /// A record's checksum does not match its contents.
    #[error("line {line}: record checksum 0x{found:02X}, expected 0x{expected:02X}")]
    Checksum { line: usize, expected: u8, found: u8 },

    /// The image file could not be read.
    #[error("unable to read firmware image: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] apoxcan_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] apoxcan_frame::FrameError),

    /// Message validation error.
    #[error("invalid message: {0}")]
    Message(#[from] MessageError),

    /// Firmware image error.
    #[error("firmware error: {0}")]
    Firmware(#[from] FirmwareError),

    /// The session is not open.
    #[error("device not opened")]
    NotOpen,

    /// No matching board response arrived in time.
    #[error("no response received for command 0x{command:02X} after {after:?}")]
    Timeout { command: u8, after: Duration },

    /// The board answered with something the helper cannot interpret.
    #[error("unexpected response to command 0x{command:02X}: {reason}")]
    UnexpectedResponse { command: u8, reason: String },

    /// The ingestion thread panicked.
    #[error("ingestion thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, SessionError>;
