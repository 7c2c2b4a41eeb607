use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use apoxcan_frame::{FrameConfig, FrameWriter};
use apoxcan_transport::{Device, TransportError};
use tracing::{debug, info, warn};

use crate::board::RequestConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SessionError};
use crate::ingest::{IngestConfig, IngestionLoop, LoopExit};
use crate::message::OutboundCanBusMessage;
use crate::transmit::Transmitter;

/// Name of the ingestion thread.
pub const INGEST_THREAD_NAME: &str = "apoxcan-ingest";

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub frame: FrameConfig,
    pub ingest: IngestConfig,
    /// Defaults for board request/response helpers.
    pub request: RequestConfig,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<LoopExit>,
}

/// An open (or openable) connection to the adapter.
///
/// `open` starts a background thread that reads the device and fills the
/// [`Dispatcher`]; sends go through a shared [`Transmitter`]. Both `open` and
/// `close` are idempotent, and dropping an open session closes it.
pub struct Session<D: Device> {
    device: D,
    config: SessionConfig,
    dispatcher: Arc<Dispatcher>,
    transmitter: Transmitter<D::Writer>,
    worker: Option<Worker>,
}

impl<D: Device> Session<D> {
    /// Create a closed session with default configuration.
    pub fn new(device: D) -> Self {
        Self::with_config(device, SessionConfig::default())
    }

    /// Create a closed session with explicit configuration.
    pub fn with_config(device: D, config: SessionConfig) -> Self {
        let transmitter = Transmitter::new(config.frame.max_outbound_payload);
        Self {
            device,
            config,
            dispatcher: Arc::new(Dispatcher::new()),
            transmitter,
            worker: None,
        }
    }

    /// Open the device and start ingesting. No-op when already open.
    pub fn open(&mut self) -> Result<()> {
        if self.worker.is_some() {
            debug!(device = %self.device.name(), "session already open");
            return Ok(());
        }

        let (reader, writer) = self.device.open()?;
        self.transmitter
            .attach(FrameWriter::with_config(writer, self.config.frame.clone()));

        let stop = Arc::new(AtomicBool::new(false));
        let ingest = IngestionLoop::new(
            reader,
            &self.config.frame,
            self.config.ingest.clone(),
            Arc::clone(&self.dispatcher),
            Arc::clone(&stop),
        );

        let spawned = thread::Builder::new()
            .name(INGEST_THREAD_NAME.to_string())
            .spawn(move || ingest.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.transmitter.detach();
                if let Err(close_err) = self.device.close() {
                    warn!(error = %close_err, "failed to close device after spawn failure");
                }
                return Err(TransportError::Io(err).into());
            }
        };

        self.worker = Some(Worker { stop, handle });
        info!(device = %self.device.name(), "session opened");
        Ok(())
    }

    /// Stop ingesting and release the device. No-op when already closed.
    ///
    /// Blocks for up to one device read timeout while the ingestion thread
    /// notices the stop flag, then waits for any in-flight write.
    pub fn close(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        worker.stop.store(true, Ordering::Release);
        let joined = worker.handle.join();

        drop(self.transmitter.detach());
        self.device.close()?;
        info!(device = %self.device.name(), "session closed");

        match joined {
            Ok(exit) => {
                debug!(?exit, "ingestion thread joined");
                Ok(())
            }
            Err(_) => Err(SessionError::WorkerPanicked),
        }
    }

    pub fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    /// Returns true while the ingestion thread is still reading.
    ///
    /// False after a disconnect even though the session remains open until closed.
    pub fn is_ingesting(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Queues filled by the ingestion thread.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// A handle for sending from other threads.
    pub fn transmitter(&self) -> Transmitter<D::Writer> {
        self.transmitter.clone()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Send a board command (7-bit code).
    pub fn send_board_command(&self, command: u8) -> Result<()> {
        self.transmitter.send_board_command(command)
    }

    /// Send a message on the CAN bus.
    pub fn send_can_bus_message(&self, message: &OutboundCanBusMessage) -> Result<()> {
        self.transmitter.send_can_bus_message(message)
    }

    /// Wrap an already encoded payload in the frame envelope and send it.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        self.transmitter.write(payload)
    }

    /// Send bytes that are already framed, unchanged.
    pub fn write_raw(&self, wire: &[u8]) -> Result<()> {
        self.transmitter.write_raw(wire)
    }
}

impl<D: Device> Drop for Session<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing session on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use apoxcan_frame::{DLE, ETX, STX};

    use super::*;
    use crate::dispatcher::{ErrorSource, Event};
    use crate::testing::MockDevice;

    #[test]
    fn open_and_close_are_idempotent() {
        let device = MockDevice::new();
        let handle = device.handle();
        let mut session = Session::new(device);

        assert!(!session.is_open());
        session.open().unwrap();
        session.open().unwrap();
        assert!(session.is_open());
        assert!(session.is_ingesting());
        assert_eq!(handle.opens(), 1);

        session.close().unwrap();
        session.close().unwrap();
        assert!(!session.is_open());
        assert_eq!(handle.closes(), 1);
    }

    #[test]
    fn reopen_after_close() {
        let device = MockDevice::new();
        let handle = device.handle();
        let mut session = Session::new(device);

        session.open().unwrap();
        session.close().unwrap();
        session.open().unwrap();
        handle.inject_frame(&[0x00, 0x85]);

        let message = session
            .dispatcher()
            .take_board_matching(|_| true, Duration::from_secs(5))
            .unwrap();
        assert_eq!(message.command, 5);
        assert_eq!(handle.opens(), 2);
    }

    #[test]
    fn send_on_closed_session_is_rejected() {
        let session = Session::new(MockDevice::new());
        assert!(matches!(session.send_board_command(0x43), Err(SessionError::NotOpen)));
        assert!(matches!(
            session.send_can_bus_message(&OutboundCanBusMessage::new(1, vec![])),
            Err(SessionError::NotOpen)
        ));
        assert!(matches!(session.write(&[0x00]), Err(SessionError::NotOpen)));
        assert!(matches!(session.write_raw(&[0x00]), Err(SessionError::NotOpen)));
    }

    #[test]
    fn inbound_frames_reach_dispatcher() {
        let device = MockDevice::new();
        let handle = device.handle();
        let mut session = Session::new(device);
        session.open().unwrap();

        handle.inject_frame(&[0xA0, 0x00, 0x00, 0x01, 0x23, 0, 0, 0, 0, 0, 2, 0xAA, 0xBB]);
        handle.inject(&[0x41]);
        handle.inject_frame(&[0x00, 0x85]);

        let mut events = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while events.len() < 3 && std::time::Instant::now() < deadline {
            session
                .dispatcher()
                .poll(Duration::from_millis(50), &mut |event: Event| events.push(event));
        }

        assert_eq!(events.len(), 3);
        assert!(events.iter().any(|e| matches!(e, Event::CanBus(m) if m.id == 0x123 && m.extended)));
        assert!(events.iter().any(|e| matches!(e, Event::Board(m) if m.command == 5)));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Error(err) if err.source == ErrorSource::Protocol)));
    }

    #[test]
    fn outbound_frames_reach_device() {
        let device = MockDevice::new();
        let handle = device.handle();
        let mut session = Session::new(device);
        session.open().unwrap();

        session.send_board_command(0x05).unwrap();
        session
            .send_can_bus_message(&OutboundCanBusMessage::new(0x123, vec![0xAA]).with_extended(true))
            .unwrap();

        assert_eq!(
            handle.written_payloads(),
            vec![
                vec![0x00, 0x85],
                vec![0xA0, 0x00, 0x00, 0x01, 0x23, 0x00, 0x00, 0x00, 0x01, 0xAA],
            ]
        );
    }

    #[test]
    fn nine_data_bytes_never_reach_device() {
        let device = MockDevice::new();
        let handle = device.handle();
        let mut session = Session::new(device);
        session.open().unwrap();

        let err = session
            .send_can_bus_message(&OutboundCanBusMessage::new(0x10, vec![0; 9]))
            .unwrap_err();
        assert!(matches!(err, SessionError::Message(_)));
        assert_eq!(handle.writes(), 0);
    }

    #[test]
    fn write_raw_is_verbatim() {
        let device = MockDevice::new();
        let handle = device.handle();
        let mut session = Session::new(device);
        session.open().unwrap();

        session.write_raw(&[DLE, STX, 0x00, 0x85, 0x85, DLE, ETX]).unwrap();
        assert_eq!(handle.written(), vec![DLE, STX, 0x00, 0x85, 0x85, DLE, ETX]);
    }

    #[test]
    fn disconnect_is_reported_and_session_stays_closable() {
        let device = MockDevice::new();
        let handle = device.handle();
        let mut session = Session::new(device);
        session.open().unwrap();

        handle.disconnect();
        let error = loop {
            let errors = session.dispatcher().drain_errors();
            if let Some(error) = errors.into_iter().next() {
                break error;
            }
            session.dispatcher().wait(Duration::from_millis(50));
        };
        assert_eq!(error.source, ErrorSource::Transport);

        session.close().unwrap();
    }

    #[test]
    fn drop_closes_device() {
        let device = MockDevice::new();
        let handle = device.handle();
        {
            let mut session = Session::new(device);
            session.open().unwrap();
        }
        assert_eq!(handle.closes(), 1);
    }

    #[test]
    fn open_failure_leaves_session_closed() {
        let device = MockDevice::failing();
        let mut session = Session::new(device);
        assert!(matches!(session.open(), Err(SessionError::Transport(_))));
        assert!(!session.is_open());
    }
}
