use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use apoxcan_frame::{Feed, FrameConfig, FrameReader};
use apoxcan_transport::{is_disconnect, is_idle};
use tracing::{debug, error, trace, warn};

use crate::dispatcher::{Dispatcher, ErrorEvent};
use crate::message::Message;

/// Default number of bytes requested per device read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Configuration for the ingestion thread.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Bytes requested per device read.
    pub read_chunk_size: usize,
    /// Pause after a failed read before trying again.
    pub read_error_backoff: Duration,
    /// Minimum interval between two queued read-error reports.
    pub error_report_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: READ_CHUNK_SIZE,
            read_error_backoff: Duration::from_millis(10),
            error_report_interval: Duration::from_secs(1),
        }
    }
}

/// Why the ingestion loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The stop flag was set.
    Stopped,
    /// The device went away.
    Disconnected,
}

/// Reads the device, frames the bytes and queues what comes out.
///
/// Runs until the stop flag is set or the device disconnects. Nothing is
/// raised across the thread boundary: protocol, decode and read errors all
/// end up in the dispatcher's error queue.
pub struct IngestionLoop<R> {
    reader: R,
    frames: FrameReader,
    dispatcher: Arc<Dispatcher>,
    stop: Arc<AtomicBool>,
    config: IngestConfig,
    last_report: Option<Instant>,
    suppressed: u64,
}

impl<R: Read> IngestionLoop<R> {
    pub fn new(
        reader: R,
        frame_config: &FrameConfig,
        config: IngestConfig,
        dispatcher: Arc<Dispatcher>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            reader,
            frames: FrameReader::with_config(frame_config),
            dispatcher,
            stop,
            config,
            last_report: None,
            suppressed: 0,
        }
    }

    /// Run until stopped or disconnected.
    pub fn run(mut self) -> LoopExit {
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        debug!("ingestion loop started");

        while !self.stop.load(Ordering::Acquire) {
            match self.reader.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    trace!(bytes = n, "read from device");
                    self.process(&chunk[..n]);
                }
                Err(err) if is_idle(&err) => {}
                Err(err) if is_disconnect(&err) => {
                    error!(error = %err, "device disconnected");
                    self.dispatcher.push_error(ErrorEvent::transport(format!(
                        "Error reading USB data: device disconnected ({err})"
                    )));
                    return LoopExit::Disconnected;
                }
                Err(err) => {
                    self.report_read_error(&err);
                    std::thread::sleep(self.config.read_error_backoff);
                }
            }
        }

        debug!("ingestion loop stopped");
        LoopExit::Stopped
    }

    /// Feed bytes to the frame reader and queue every outcome.
    pub fn process(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            match self.frames.feed(byte) {
                Feed::Pending => {}
                Feed::Frame(frame) => match Message::decode(&frame) {
                    Ok(Message::Board(message)) => self.dispatcher.push_board(message),
                    Ok(Message::CanBus(message)) => self.dispatcher.push_can_bus(message),
                    Err(err) => {
                        warn!(error = %err, "undecodable frame");
                        self.dispatcher.push_error(ErrorEvent::message(&err));
                    }
                },
                Feed::Error(err) => {
                    warn!(error = %err, "framing error");
                    self.dispatcher.push_error(ErrorEvent::protocol(&err));
                }
            }
        }
    }

    fn report_read_error(&mut self, err: &std::io::Error) {
        let now = Instant::now();
        let due = self
            .last_report
            .is_none_or(|last| now.duration_since(last) >= self.config.error_report_interval);
        if !due {
            self.suppressed += 1;
            return;
        }

        error!(error = %err, suppressed = self.suppressed, "device read failed");
        let message = if self.suppressed > 0 {
            format!(
                "Error reading USB data: {err} ({} similar errors suppressed)",
                self.suppressed
            )
        } else {
            format!("Error reading USB data: {err}")
        };
        self.dispatcher.push_error(ErrorEvent::transport(message));
        self.last_report = Some(now);
        self.suppressed = 0;
    }
}
