use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use apoxcan_frame::{FrameError, FrameWriter};
use tracing::trace;

use crate::error::{Result, SessionError};
use crate::message::{OutboundBoardCommand, OutboundCanBusMessage};

/// Serialized write access to the device.
///
/// Clones share the same writer. Every operation validates its input first,
/// then holds the write lock for exactly one frame, so concurrent senders
/// never interleave bytes on the wire.
pub struct Transmitter<W> {
    writer: Arc<Mutex<Option<FrameWriter<W>>>>,
    max_outbound: usize,
}

impl<W> Clone for Transmitter<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            max_outbound: self.max_outbound,
        }
    }
}

impl<W: Write> Transmitter<W> {
    /// A detached transmitter; sends fail with `NotOpen` until a writer is attached.
    pub fn new(max_outbound: usize) -> Self {
        Self {
            writer: Arc::new(Mutex::new(None)),
            max_outbound,
        }
    }

    /// Install the device writer.
    pub fn attach(&self, writer: FrameWriter<W>) {
        *self.lock() = Some(writer);
    }

    /// Remove the device writer, waiting for any in-flight write to finish.
    pub fn detach(&self) -> Option<FrameWriter<W>> {
        self.lock().take()
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    /// Send a board command.
    pub fn send_board_command(&self, command: u8) -> Result<()> {
        let payload = OutboundBoardCommand::new(command).encode()?;
        trace!(command, "sending board command");
        self.with_writer(|writer| writer.send(&payload))
    }

    /// Send a message on the CAN bus.
    pub fn send_can_bus_message(&self, message: &OutboundCanBusMessage) -> Result<()> {
        let payload = message.encode()?;
        trace!(id = message.id, len = message.data.len(), "sending CAN-bus message");
        self.with_writer(|writer| writer.send(&payload))
    }

    /// Wrap an already encoded payload in the frame envelope and send it.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_outbound {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_outbound,
            }
            .into());
        }
        self.with_writer(|writer| writer.send(payload))
    }

    /// Send bytes that are already framed, unchanged.
    pub fn write_raw(&self, wire: &[u8]) -> Result<()> {
        self.with_writer(|writer| writer.send_raw(wire))
    }

    fn with_writer(
        &self,
        op: impl FnOnce(&mut FrameWriter<W>) -> apoxcan_frame::Result<()>,
    ) -> Result<()> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(SessionError::NotOpen)?;
        op(writer)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<FrameWriter<W>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
