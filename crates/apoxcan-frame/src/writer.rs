use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, max_encoded_len, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` stream.
///
/// Each frame is built in a scratch buffer sized for the largest outbound
/// payload and handed to the stream in as few writes as it accepts.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(max_encoded_len(config.max_outbound_payload)),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.payload.as_ref())
    }

    /// Wrap a payload in the frame envelope and send it.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_outbound_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_outbound_payload,
            });
        }

        self.buf.clear();
        encode_frame(payload, &mut self.buf);

        write_all(&mut self.inner, &self.buf)?;
        self.flush()
    }

    /// Send bytes that are already framed, unchanged.
    pub fn send_raw(&mut self, wire: &[u8]) -> Result<()> {
        write_all(&mut self.inner, wire)?;
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn write_all<T: Write>(inner: &mut T, bytes: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        match inner.write(&bytes[offset..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use super::*;
    use crate::codec::{decode_frame, DLE, ETX, STX};
    use crate::reader::{Feed, FrameReader};

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(&[0x00, 0x85]).unwrap();

        let wire = written(writer);
        assert_eq!(wire.as_ref(), &[DLE, STX, 0x00, 0x85, 0x85, DLE, ETX]);
    }

    #[test]
    fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&[0x00, 0xC3]).unwrap();
        writer.send(&[0x80, 0x00, 0x00, 0x01, 0x23, 0, 0, 0, 1, DLE]).unwrap();
        writer.send(&[0x00, 0xC4]).unwrap();

        let mut wire = written(writer);
        let f1 = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        let f2 = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        let f3 = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();

        assert_eq!(f1.payload.as_ref(), &[0x00, 0xC3]);
        assert_eq!(f2.payload.as_ref(), &[0x80, 0x00, 0x00, 0x01, 0x23, 0, 0, 0, 1, DLE]);
        assert_eq!(f3.payload.as_ref(), &[0x00, 0xC4]);
        assert!(wire.is_empty());
    }

    #[test]
    fn payload_too_large_rejected_without_writing() {
        let cfg = FrameConfig {
            max_outbound_payload: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send(b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn firmware_block_fits_default_limit() {
        let mut block = vec![0x00, 0x10];
        block.extend(std::iter::repeat_n(DLE, 64));

        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(&block).unwrap();

        let mut wire = written(writer);
        let frame = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), block.as_slice());
    }

    #[test]
    fn send_raw_writes_bytes_verbatim() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_raw(&[DLE, STX, 0xAB]).unwrap();
        assert_eq!(written(writer).as_ref(), &[DLE, STX, 0xAB]);
    }

    #[test]
    fn flush_follows_each_frame() {
        let mut writer = FrameWriter::new(SerialLink::new(usize::MAX));
        writer.send(&[0x00, 0xC3]).unwrap();
        writer.send(&[0x00, DLE]).unwrap();

        let first = encoded(&[0x00, 0xC3]).len();
        let second = encoded(&[0x00, DLE]).len();
        let link = writer.into_inner();
        assert_eq!(link.flushed_at, vec![first, first + second]);
    }

    #[test]
    fn stuffed_frame_survives_a_chunked_stalling_link() {
        // Three DLE data bytes and a checksum of DLE.
        let payload = [0x00, DLE, DLE, DLE];
        let link = SerialLink::new(3).stalling(&[
            ErrorKind::Interrupted,
            ErrorKind::WouldBlock,
            ErrorKind::Interrupted,
        ]);

        let mut writer = FrameWriter::new(link);
        writer.send(&payload).unwrap();

        let link = writer.into_inner();
        assert_eq!(link.wire, encoded(&payload).to_vec());
        assert_eq!(link.flushed_at, vec![link.wire.len()]);

        let outcomes = FrameReader::new().feed_all(&link.wire);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0], Feed::Frame(f) if f.payload.as_ref() == payload));
    }

    #[test]
    fn firmware_block_one_byte_at_a_time() {
        let mut block = vec![0x40, 0x00];
        block.extend((0..64u8).map(|i| if i % 2 == 0 { DLE } else { i }));

        let mut writer = FrameWriter::new(SerialLink::new(1));
        writer.send(&block).unwrap();

        let mut wire = BytesMut::from(writer.into_inner().wire.as_slice());
        let frame = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), block.as_slice());
    }

    #[test]
    fn unplugged_adapter_mid_frame_is_connection_closed() {
        let mut writer = FrameWriter::new(SerialLink::new(2).unplugged_after(4));
        let err = writer.send(&[0x00, 0x42, 0x01]).unwrap_err();

        assert!(matches!(err, FrameError::ConnectionClosed));
        let link = writer.into_inner();
        assert_eq!(link.wire, vec![DLE, STX, 0x00, 0x42]);
        assert!(link.flushed_at.is_empty());
    }

    #[test]
    fn link_failure_is_reported_as_io() {
        let link = SerialLink::new(8).stalling(&[ErrorKind::BrokenPipe]);
        let mut writer = FrameWriter::new(link);

        let err = writer.send(&[0x00, 0x42]).unwrap_err();
        assert!(matches!(err, FrameError::Io(ref io) if io.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        assert_eq!(writer.config().max_outbound_payload, 256);
        let _inner = writer.into_inner();
    }

    fn encoded(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(payload, &mut buf);
        buf
    }

    /// Adapter link that takes at most `chunk` bytes per write, can fail
    /// with scripted errors, and can stop accepting bytes altogether.
    struct SerialLink {
        chunk: usize,
        stalls: VecDeque<ErrorKind>,
        capacity: Option<usize>,
        wire: Vec<u8>,
        /// Wire length at every successful flush.
        flushed_at: Vec<usize>,
    }

    impl SerialLink {
        fn new(chunk: usize) -> Self {
            Self {
                chunk,
                stalls: VecDeque::new(),
                capacity: None,
                wire: Vec::new(),
                flushed_at: Vec::new(),
            }
        }

        fn stalling(mut self, kinds: &[ErrorKind]) -> Self {
            self.stalls.extend(kinds.iter().copied());
            self
        }

        fn unplugged_after(mut self, bytes: usize) -> Self {
            self.capacity = Some(bytes);
            self
        }
    }

    impl Write for SerialLink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.stalls.pop_front() {
                return Err(kind.into());
            }
            let room = self
                .capacity
                .map_or(usize::MAX, |cap| cap.saturating_sub(self.wire.len()));
            let n = buf.len().min(self.chunk).min(room);
            self.wire.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Some(kind) = self.stalls.pop_front() {
                return Err(kind.into());
            }
            self.flushed_at.push(self.wire.len());
            Ok(())
        }
    }
}
