//! RFC 6455 frame types and codec.
//!
//! A WebSocket message is carried as a sequence of frames:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |         (16 or 64 bits)       |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |    Extended payload length continued, if payload len == 127   |
//! +---------------------------------------------------------------+
//! |                               | Masking-key, if MASK set to 1 |
//! +-------------------------------+-------------------------------+
//! |    Masking-key (continued)    |          Payload Data         |
//! +---------------------------------------------------------------+
//! ```
//!
//! [`Frame`] is the parsed representation; [`FrameCodec`](codec::FrameCodec)
//! handles the wire encoding, incremental decoding, and masking rules for
//! either connection role.

pub mod codec;

use bytes::Bytes;

use crate::base::closecode::CloseCode;
use crate::base::wserror::WsError;

/// 4-bit frame type tag.
///
/// Data frames (`Continuation`, `Text`, `Binary`) carry application payload;
/// control frames (`Close`, `Ping`, `Pong`) manage the connection and must
/// fit in a single unfragmented frame of at most 125 payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Whether this opcode tags a control frame (`Close`, `Ping`, `Pong`).
    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Whether this opcode starts a data message (`Text` or `Binary`).
    pub fn is_data(&self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WsError;

    /// Parses the opcode nibble. 0x3-0x7 and 0xB-0xF are reserved and
    /// rejected as protocol errors.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(WsError::protocol(
                format!("reserved opcode 0x{value:x}"),
                CloseCode::PROTOCOL_ERROR.0,
            )),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// A single parsed WebSocket frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Final fragment flag. `true` means this frame completes a message.
    pub fin: bool,
    /// Frame type.
    pub opcode: OpCode,
    /// Masking key the frame arrived with, if any.
    pub mask: Option<[u8; 4]>,
    /// RSV1 flag: payload is compressed under a negotiated extension.
    pub compressed: bool,
    /// Frame payload.
    pub payload: Bytes,
}

impl Frame {
    fn data(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            mask: None,
            compressed: false,
            payload: payload.into(),
        }
    }

    /// Creates a text frame with the given payload.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::data(OpCode::Text, payload)
    }

    /// Creates a binary frame with the given payload.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::data(OpCode::Binary, payload)
    }

    /// Creates a ping frame with the given payload.
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::data(OpCode::Ping, payload)
    }

    /// Creates a pong frame with the given payload.
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::data(OpCode::Pong, payload)
    }

    /// Creates a continuation frame with the given payload.
    ///
    /// `fin` defaults to `true`; use [`Frame::with_fin`] for non-final
    /// fragments.
    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::data(OpCode::Continuation, payload)
    }

    /// Creates a close frame carrying a status code and reason.
    pub fn close(code: CloseCode, reason: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.0.to_be_bytes());
        payload.extend_from_slice(reason);
        Self::data(OpCode::Close, payload)
    }

    /// Creates a close frame with an empty payload (no status code).
    pub fn close_empty() -> Self {
        Self::data(OpCode::Close, Bytes::new())
    }

    /// Sets the fin flag, for building fragmented messages.
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }
}
