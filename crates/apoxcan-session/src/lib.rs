//! Session layer for the Apox USB-CAN adapter.
//!
//! A [`Session`] owns a [`Device`](apoxcan_transport::Device), runs a
//! background ingestion thread that turns the inbound byte stream into
//! [`BoardMessage`]s, [`CanBusMessage`]s and [`ErrorEvent`]s, and serializes
//! outbound board commands and CAN-bus messages onto the wire.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use apoxcan_session::{Event, OutboundCanBusMessage, Session};
//! use apoxcan_transport::SerialDevice;
//!
//! let mut session = Session::new(SerialDevice::new("/dev/ttyUSB0"));
//! session.open()?;
//! println!("firmware {}", session.firmware_version()?);
//!
//! session.send_can_bus_message(&OutboundCanBusMessage::new(0x123, vec![0xAA, 0xBB]))?;
//! session.dispatcher().poll(Duration::from_secs(1), &mut |event: Event| {
//!     println!("{event:?}");
//! });
//! session.close()?;
//! # Ok::<(), apoxcan_session::SessionError>(())
//! ```

pub mod board;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod firmware;
pub mod ingest;
pub mod message;
pub mod session;
pub mod transmit;

#[cfg(test)]
mod testing;

pub use board::{RequestConfig, RunningCode, DEFAULT_REQUEST_TIMEOUT};
pub use command::{command_by_name, command_name};
pub use dispatcher::{Dispatcher, ErrorEvent, ErrorSource, Event, EventHandler};
pub use error::{FirmwareError, MessageError, Result, SessionError};
pub use firmware::{FirmwareBlock, FirmwareImage};
pub use ingest::{IngestConfig, IngestionLoop, LoopExit};
pub use message::{
    BoardMessage, CanBusMessage, Message, OutboundBoardCommand, OutboundCanBusMessage,
};
pub use session::{Session, SessionConfig};
pub use transmit::Transmitter;
