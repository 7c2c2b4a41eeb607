//! In-memory adapter used by the session tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apoxcan_frame::{encode_frame, Feed, FrameReader};
use apoxcan_transport::{Device, TransportError};
use bytes::BytesMut;

/// Answers each decoded outbound payload with zero or more inbound payloads.
pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Clone, Default)]
pub(crate) struct MockHandle {
    inbound: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
    written: Arc<Mutex<Vec<u8>>>,
    writes: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockHandle {
    pub fn inject(&self, bytes: &[u8]) {
        if let Some(tx) = self.inbound.lock().unwrap().as_ref() {
            let _ = tx.send(bytes.to_vec());
        }
    }

    pub fn inject_frame(&self, payload: &[u8]) {
        self.inject(&frame(payload));
    }

    /// Drop the inbound channel; the reader then sees end-of-stream.
    pub fn disconnect(&self) {
        self.inbound.lock().unwrap().take();
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn written_payloads(&self) -> Vec<Vec<u8>> {
        FrameReader::new()
            .feed_all(&self.written())
            .into_iter()
            .filter_map(|outcome| match outcome {
                Feed::Frame(frame) => Some(frame.payload.to_vec()),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub(crate) fn frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_frame(payload, &mut buf);
    buf.to_vec()
}

pub(crate) struct MockDevice {
    handle: MockHandle,
    responder: Option<Arc<Mutex<Responder>>>,
    fail_open: bool,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            handle: MockHandle::default(),
            responder: None,
            fail_open: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    pub fn with_responder(
        mut self,
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    ) -> Self {
        self.responder = Some(Arc::new(Mutex::new(Box::new(responder))));
        self
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl Device for MockDevice {
    type Reader = ChannelReader;
    type Writer = MockWriter;

    fn open(&mut self) -> apoxcan_transport::Result<(Self::Reader, Self::Writer)> {
        if self.fail_open {
            return Err(TransportError::Open {
                device: self.name(),
                source: io::ErrorKind::NotFound.into(),
            });
        }

        let (tx, rx) = mpsc::channel();
        *self.handle.inbound.lock().unwrap() = Some(tx);
        self.handle.opens.fetch_add(1, Ordering::SeqCst);

        let reader = ChannelReader {
            rx,
            pending: VecDeque::new(),
        };
        let writer = MockWriter {
            handle: self.handle.clone(),
            frames: FrameReader::new(),
            responder: self.responder.clone(),
        };
        Ok((reader, writer))
    }

    fn close(&mut self) -> apoxcan_transport::Result<()> {
        self.handle.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}

pub(crate) struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(10)) {
                Ok(bytes) => self.pending.extend(bytes),
                Err(RecvTimeoutError::Timeout) => return Err(io::ErrorKind::TimedOut.into()),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::ErrorKind::UnexpectedEof.into())
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

pub(crate) struct MockWriter {
    handle: MockHandle,
    frames: FrameReader,
    responder: Option<Arc<Mutex<Responder>>>,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle.writes.fetch_add(1, Ordering::SeqCst);
        self.handle.written.lock().unwrap().extend_from_slice(buf);

        for outcome in self.frames.feed_all(buf) {
            if let (Feed::Frame(frame), Some(responder)) = (outcome, self.responder.as_ref()) {
                let replies = {
                    let mut respond = responder.lock().unwrap();
                    (*respond)(frame.payload.as_ref())
                };
                for reply in replies {
                    self.handle.inject_frame(&reply);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
