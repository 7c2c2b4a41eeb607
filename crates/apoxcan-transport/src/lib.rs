//! Byte-stream device abstraction for the Apox USB-CAN adapter.
//!
//! The adapter is an FTDI bridge: once opened it is nothing more than a
//! blocking byte source and a byte sink. This crate provides:
//! - the [`Device`] trait the session layer opens to obtain read/write halves
//! - [`SerialDevice`], the adapter as a local serial port (`/dev/ttyUSB0`, `COM3`)
//! - [`TcpDevice`], the adapter behind a serial-over-TCP bridge
//!
//! This is the lowest layer of apoxcan. Everything else builds on top of
//! the halves returned by [`Device::open`].

pub mod error;
pub mod serial;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::{SerialConfig, SerialDevice, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};
pub use tcp::{TcpConfig, TcpDevice, TcpReader};
pub use traits::{is_disconnect, is_idle, Device};
