//! Driver for the Apox USB-CAN adapter.
//!
//! The adapter bridges a CAN bus to a host over an FTDI serial link and
//! speaks a byte-stuffed framing protocol carrying two message families:
//! CAN-bus traffic and board (adapter firmware) commands.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream devices (serial port, TCP bridge)
//! - [`frame`]: DLE/STX byte-stuffed framing with XOR checksum
//! - [`session`]: message codec, dispatcher queues, ingestion thread and send path

/// Re-export transport types.
pub mod transport {
    pub use apoxcan_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use apoxcan_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use apoxcan_session::*;
}
