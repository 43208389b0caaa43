//! Message reassembly from fragmented frames.

use bytes::{Bytes, BytesMut};

use crate::base::closecode::CloseCode;
use crate::base::wserror::WsError;
use crate::frame::{Frame, OpCode};

/// A complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text message (validated UTF-8)
    Text(String),
    /// Binary message
    Binary(Bytes),
}

/// Accumulates data frames into messages.
///
/// A message is a single fin data frame, or a non-fin Text/Binary frame
/// followed by zero or more non-fin continuations and one fin continuation.
/// Control frames never pass through here, so an interleaved ping cannot
/// disturb the accumulation buffer.
#[derive(Debug)]
pub(crate) struct MessageAssembler {
    opcode: Option<OpCode>,
    buf: BytesMut,
    max_size: usize,
}

impl MessageAssembler {
    pub fn new(max_size: usize) -> Self {
        Self {
            opcode: None,
            buf: BytesMut::new(),
            max_size,
        }
    }

    /// Whether a fragmented message is currently accumulating.
    #[cfg(test)]
    pub fn in_progress(&self) -> bool {
        self.opcode.is_some()
    }

    /// Feeds one data frame; returns a message when one completes.
    pub fn on_frame(&mut self, frame: Frame) -> Result<Option<Message>, WsError> {
        match frame.opcode {
            OpCode::Text | OpCode::Binary => {
                if self.opcode.is_some() {
                    return Err(WsError::protocol(
                        "new data frame during fragmented message",
                        CloseCode::PROTOCOL_ERROR.0,
                    ));
                }
                if frame.payload.len() > self.max_size {
                    return Err(self.too_big());
                }
                if frame.fin {
                    return complete(frame.opcode, frame.payload).map(Some);
                }
                self.opcode = Some(frame.opcode);
                self.buf.extend_from_slice(&frame.payload);
                Ok(None)
            }
            OpCode::Continuation => {
                let Some(opcode) = self.opcode else {
                    return Err(WsError::protocol(
                        "continuation frame with no message in progress",
                        CloseCode::PROTOCOL_ERROR.0,
                    ));
                };
                if self.buf.len() + frame.payload.len() > self.max_size {
                    return Err(self.too_big());
                }
                self.buf.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(None);
                }
                self.opcode = None;
                let payload = self.buf.split().freeze();
                complete(opcode, payload).map(Some)
            }
            _ => Err(WsError::protocol(
                "control frame routed to reassembly",
                CloseCode::PROTOCOL_ERROR.0,
            )),
        }
    }

    fn too_big(&self) -> WsError {
        WsError::protocol(
            format!("message exceeds maximum size of {} bytes", self.max_size),
            CloseCode::MESSAGE_TOO_BIG.0,
        )
    }
}

fn complete(opcode: OpCode, payload: Bytes) -> Result<Message, WsError> {
    match opcode {
        OpCode::Text => {
            let text = String::from_utf8(payload.to_vec()).map_err(|_| {
                WsError::protocol("invalid UTF-8 in text message", CloseCode::ENCODING.0)
            })?;
            Ok(Message::Text(text))
        }
        _ => Ok(Message::Binary(payload)),
    }
}
