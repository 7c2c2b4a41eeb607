//! Fixed binary layouts carried inside frames.
//!
//! Inbound, the first payload byte selects the message kind: `0x00` and
//! `0xFF` are board messages from the adapter firmware, anything else is a
//! message received from the CAN bus. Outbound, board commands and CAN-bus
//! transmissions are encoded into payloads that the frame writer wraps.
//!
//! Inbound and outbound CAN-bus layouts are not symmetric:
//!
//! ```text
//! inbound:  flags | id[4] | timestamp[4] (LE) | status | len | data[..8]
//! outbound: flags | id[4] | reserved[2] | tx_flags | len | data[..8]
//! ```

use apoxcan_frame::{Frame, FrameKind};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::MessageError;

/// Board message id of a response to a command.
pub const BOARD_ID_RESPONSE: u8 = 0x00;
/// Board message id of an unsolicited emergency message.
pub const BOARD_ID_EMERGENCY: u8 = 0xFF;

/// Largest board message data section.
pub const MAX_BOARD_DATA: usize = 253;
/// Largest CAN-bus data section.
pub const MAX_CAN_DATA: usize = 8;

/// Largest 29-bit extended identifier.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Largest 11-bit standard identifier.
pub const MAX_STANDARD_ID: u32 = 0x7FF;

const BOARD_HEADER_LEN: usize = 2;
const CAN_HEADER_LEN: usize = 11;
const CAN_OUT_HEADER_LEN: usize = 9;

const CAN_MARKER: u8 = 0x80;
const CAN_RTR: u8 = 0x40;
const CAN_EXTENDED: u8 = 0x20;

/// A message from the adapter firmware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardMessage {
    /// `0x00` for a command response, `0xFF` for an emergency message.
    pub id: u8,
    /// 7-bit command (or error) code.
    pub command: u8,
    /// Response data, or the error code of an emergency message.
    pub data: Vec<u8>,
}

impl BoardMessage {
    /// Decode a board message payload. Data beyond 253 bytes is dropped.
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        if payload.len() < BOARD_HEADER_LEN {
            return Err(MessageError::Truncated {
                kind: "board",
                len: payload.len(),
                min: BOARD_HEADER_LEN,
            });
        }

        let end = payload.len().min(BOARD_HEADER_LEN + MAX_BOARD_DATA);
        Ok(Self {
            id: payload[0],
            command: payload[1] & 0x7F,
            data: payload[BOARD_HEADER_LEN..end].to_vec(),
        })
    }

    /// Returns true for unsolicited emergency messages.
    pub fn is_emergency(&self) -> bool {
        self.id == BOARD_ID_EMERGENCY
    }

    /// Returns true for a command response carrying `command`.
    pub fn is_response_to(&self, command: u8) -> bool {
        self.id == BOARD_ID_RESPONSE && self.command == command
    }
}

/// A message received from the CAN bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanBusMessage {
    /// Remote transmission request.
    pub rtr: bool,
    /// 29-bit identifier when set, 11-bit otherwise.
    pub extended: bool,
    pub id: u32,
    /// Adapter receive timestamp.
    pub timestamp: u32,
    /// Receive status flags.
    pub flags: u8,
    pub data: Vec<u8>,
}

impl CanBusMessage {
    /// Decode a CAN-bus message payload.
    ///
    /// The data section is clamped to both 8 bytes and the bytes actually
    /// present, whatever length the header declares.
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        if payload.len() < CAN_HEADER_LEN {
            return Err(MessageError::Truncated {
                kind: "CAN-bus",
                len: payload.len(),
                min: CAN_HEADER_LEN,
            });
        }

        let id = u32::from(payload[1] & 0x1F) << 24
            | u32::from(payload[2]) << 16
            | u32::from(payload[3]) << 8
            | u32::from(payload[4]);
        let timestamp = u32::from_le_bytes([payload[5], payload[6], payload[7], payload[8]]);

        let declared = usize::from(payload[10]).min(MAX_CAN_DATA);
        let available = payload.len() - CAN_HEADER_LEN;
        let len = declared.min(available);

        Ok(Self {
            rtr: payload[0] & CAN_RTR != 0,
            extended: payload[0] & CAN_EXTENDED != 0,
            id,
            timestamp,
            flags: payload[9],
            data: payload[CAN_HEADER_LEN..CAN_HEADER_LEN + len].to_vec(),
        })
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Board(BoardMessage),
    CanBus(CanBusMessage),
}

impl Message {
    /// Decode a validated frame according to its first byte.
    pub fn decode(frame: &Frame) -> Result<Self, MessageError> {
        match frame.kind() {
            Some(FrameKind::Board) => BoardMessage::decode(&frame.payload).map(Self::Board),
            Some(FrameKind::CanBus) => CanBusMessage::decode(&frame.payload).map(Self::CanBus),
            None => Err(MessageError::Truncated {
                kind: "empty",
                len: 0,
                min: 1,
            }),
        }
    }
}

/// A command for the adapter firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundBoardCommand {
    pub command: u8,
}

impl OutboundBoardCommand {
    pub fn new(command: u8) -> Self {
        Self { command }
    }

    /// Encode as `[0x00, command | 0x80]`.
    pub fn encode(&self) -> Result<[u8; 2], MessageError> {
        if self.command > 0x7F {
            return Err(MessageError::InvalidCommand(self.command));
        }
        Ok([BOARD_ID_RESPONSE, self.command | 0x80])
    }
}

/// A message to transmit on the CAN bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCanBusMessage {
    pub rtr: bool,
    pub id: u32,
    pub extended: bool,
    pub data: Vec<u8>,
    /// Transmit flags passed through to the adapter.
    pub tx_flags: u8,
}

impl OutboundCanBusMessage {
    /// Create a data frame. Identifiers above `0x7FF` select the extended format.
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            rtr: false,
            id,
            extended: id > MAX_STANDARD_ID,
            data: data.into(),
            tx_flags: 0,
        }
    }

    /// Create a remote transmission request.
    pub fn remote(id: u32) -> Self {
        Self::new(id, Vec::new()).with_rtr(true)
    }

    pub fn with_rtr(mut self, rtr: bool) -> Self {
        self.rtr = rtr;
        self
    }

    pub fn with_extended(mut self, extended: bool) -> Self {
        self.extended = extended;
        self
    }

    pub fn with_tx_flags(mut self, tx_flags: u8) -> Self {
        self.tx_flags = tx_flags;
        self
    }

    /// Check data length and identifier range without encoding.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.data.len() > MAX_CAN_DATA {
            return Err(MessageError::DataTooLong {
                len: self.data.len(),
            });
        }
        let max_id = if self.extended {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if self.id > max_id {
            return Err(MessageError::InvalidId {
                id: self.id,
                extended: self.extended,
            });
        }
        Ok(())
    }

    /// Encode into the outbound CAN-bus payload layout.
    pub fn encode(&self) -> Result<Bytes, MessageError> {
        self.validate()?;

        let mut flags = CAN_MARKER;
        if self.rtr {
            flags |= CAN_RTR;
        }
        if self.extended {
            flags |= CAN_EXTENDED;
        }

        let mut buf = BytesMut::with_capacity(CAN_OUT_HEADER_LEN + self.data.len());
        buf.put_u8(flags);
        buf.put_u8(((self.id >> 24) & 0x1F) as u8);
        buf.put_u8((self.id >> 16) as u8);
        buf.put_u8((self.id >> 8) as u8);
        buf.put_u8(self.id as u8);
        buf.put_u8(0x00);
        buf.put_u8(0x00);
        buf.put_u8(self.tx_flags);
        buf.put_u8(self.data.len() as u8);
        buf.put_slice(&self.data);
        Ok(buf.freeze())
    }
}
