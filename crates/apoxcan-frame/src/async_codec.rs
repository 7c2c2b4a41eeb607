use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, ProtocolError};
use crate::reader::{Feed, FrameReader};

/// `tokio_util` codec for the byte-stuffed frame format.
///
/// Protocol errors are yielded as items rather than stream errors, so a
/// `FramedRead` keeps going after a corrupt frame just like the blocking
/// reader does. Only I/O failures end the stream.
#[derive(Debug)]
pub struct StuffedCodec {
    reader: FrameReader,
    config: FrameConfig,
}

impl StuffedCodec {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            reader: FrameReader::with_config(&config),
            config,
        }
    }
}

impl Default for StuffedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StuffedCodec {
    type Item = std::result::Result<Frame, ProtocolError>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Bytes are consumed as they are fed; the reader keeps partial state.
        while src.has_remaining() {
            let byte = src.get_u8();
            match self.reader.feed(byte) {
                Feed::Pending => {}
                Feed::Frame(frame) => return Ok(Some(Ok(frame))),
                Feed::Error(err) => return Ok(Some(Err(err))),
            }
        }
        Ok(None)
    }
}

impl Encoder<&[u8]> for StuffedCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        if payload.len() > self.config.max_outbound_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_outbound_payload,
            });
        }
        encode_frame(payload, dst);
        Ok(())
    }
}
