//! Wire encoding and incremental decoding of frames.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Frame, OpCode};
use crate::base::closecode::CloseCode;
use crate::base::wserror::WsError;

/// Largest possible frame header: 2 fixed bytes + 8 extended-length bytes +
/// 4 masking-key bytes.
const MAX_HEADER_SIZE: usize = 14;

/// Which end of the connection this codec sits on.
///
/// The role decides the masking rules: client-to-server frames must be
/// masked, server-to-client frames must not be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Frame encoder/decoder for one connection.
///
/// Decoding is incremental: [`FrameCodec::decode`] is handed the unconsumed
/// read buffer and either returns a complete frame with the number of bytes
/// it used, or `Ok(None)` when the buffer holds only a partial frame.
/// Nothing is consumed on `Ok(None)`, so retrying with more appended bytes
/// is always safe.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    role: Role,
    accept_compressed: bool,
}

impl FrameCodec {
    /// Codec for the client end: masks outgoing frames, rejects masked
    /// incoming frames.
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            accept_compressed: false,
        }
    }

    /// Codec for the server end: expects masked incoming frames, sends
    /// unmasked.
    pub fn server() -> Self {
        Self {
            role: Role::Server,
            accept_compressed: false,
        }
    }

    /// Tolerate the RSV1 (per-message compression) bit on incoming data
    /// frames. Only set after the extension was negotiated in the handshake.
    pub fn set_accept_compressed(&mut self, accept: bool) {
        self.accept_compressed = accept;
    }

    /// Encodes a frame for the wire, masking the payload when this is the
    /// client end.
    pub fn encode(&self, frame: &Frame) -> Result<Bytes, WsError> {
        let len = frame.payload.len();
        if frame.opcode.is_control() {
            if len > 125 {
                return Err(WsError::protocol(
                    "control frame payload exceeds 125 bytes",
                    CloseCode::PROTOCOL_ERROR.0,
                ));
            }
            if !frame.fin {
                return Err(WsError::protocol(
                    "control frames must not be fragmented",
                    CloseCode::PROTOCOL_ERROR.0,
                ));
            }
        }

        let mut out = BytesMut::with_capacity(MAX_HEADER_SIZE + len);
        let mut b0 = u8::from(frame.opcode);
        if frame.fin {
            b0 |= 0x80;
        }
        if frame.compressed {
            b0 |= 0x40;
        }
        out.put_u8(b0);

        let mask_bit: u8 = if self.role == Role::Client { 0x80 } else { 0 };
        if len <= 125 {
            out.put_u8(mask_bit | len as u8);
        } else if len <= 65535 {
            out.put_u8(mask_bit | 126);
            out.put_u16(len as u16);
        } else {
            out.put_u8(mask_bit | 127);
            out.put_u64(len as u64);
        }

        if self.role == Role::Client {
            let mut key = [0u8; 4];
            boring::rand::rand_bytes(&mut key)
                .map_err(|e| WsError::write(format!("mask key generation failed: {e}")))?;
            out.put_slice(&key);
            let mut masked = frame.payload.to_vec();
            apply_mask(&mut masked, key);
            out.put_slice(&masked);
        } else {
            out.put_slice(&frame.payload);
        }

        Ok(out.freeze())
    }

    /// Decodes the first complete frame from `buf`.
    ///
    /// Returns `Ok(Some((frame, consumed)))` on success, `Ok(None)` when
    /// more bytes are needed (consuming nothing), or a protocol error for
    /// malformed input. Masked payloads are unmasked before return.
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Frame, usize)>, WsError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let b0 = buf[0];
        let b1 = buf[1];
        let fin = b0 & 0x80 != 0;
        let rsv = b0 & 0x70;
        let compressed = b0 & 0x40 != 0;
        if rsv != 0 && !(self.accept_compressed && rsv == 0x40) {
            return Err(WsError::protocol(
                format!("unexpected RSV bits 0x{:x}", rsv >> 4),
                CloseCode::PROTOCOL_ERROR.0,
            ));
        }

        let opcode = OpCode::try_from(b0 & 0x0F)?;
        if opcode.is_control() {
            if !fin {
                return Err(WsError::protocol(
                    "control frames must not be fragmented",
                    CloseCode::PROTOCOL_ERROR.0,
                ));
            }
            if compressed {
                return Err(WsError::protocol(
                    "control frames must not be compressed",
                    CloseCode::PROTOCOL_ERROR.0,
                ));
            }
        }

        let masked = b1 & 0x80 != 0;
        let expect_masked = self.role == Role::Server;
        if masked != expect_masked {
            return Err(WsError::protocol(
                if masked {
                    "unexpected masked frame from peer"
                } else {
                    "peer frame missing required mask"
                },
                CloseCode::PROTOCOL_ERROR.0,
            ));
        }

        let mut offset = 2usize;
        let payload_len: u64 = match b1 & 0x7F {
            126 => {
                if buf.len() < offset + 2 {
                    return Ok(None);
                }
                let v = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as u64;
                offset += 2;
                v
            }
            127 => {
                if buf.len() < offset + 8 {
                    return Ok(None);
                }
                let mut be = [0u8; 8];
                be.copy_from_slice(&buf[offset..offset + 8]);
                let v = u64::from_be_bytes(be);
                if v >> 63 != 0 {
                    return Err(WsError::protocol(
                        "64-bit payload length has most significant bit set",
                        CloseCode::PROTOCOL_ERROR.0,
                    ));
                }
                offset += 8;
                v
            }
            n => n as u64,
        };

        if opcode.is_control() && payload_len > 125 {
            return Err(WsError::protocol(
                "control frame payload exceeds 125 bytes",
                CloseCode::PROTOCOL_ERROR.0,
            ));
        }

        let mask = if masked {
            if buf.len() < offset + 4 {
                return Ok(None);
            }
            let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            offset += 4;
            Some(key)
        } else {
            None
        };

        let payload_len = usize::try_from(payload_len).map_err(|_| {
            WsError::protocol(
                "frame payload exceeds addressable memory",
                CloseCode::MESSAGE_TOO_BIG.0,
            )
        })?;
        if buf.len() - offset < payload_len {
            return Ok(None);
        }

        let mut payload = buf[offset..offset + payload_len].to_vec();
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        Ok(Some((
            Frame {
                fin,
                opcode,
                mask,
                compressed,
                payload: Bytes::from(payload),
            },
            offset + payload_len,
        )))
    }
}

/// Rotating 4-byte XOR mask, applied in place. Masking and unmasking are the
/// same operation.
fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b ^= key[i & 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(payload_len: usize) -> (Bytes, usize) {
        let payload = vec![0xAB_u8; payload_len];
        let frame = Frame::binary(payload.clone());
        let encoded = FrameCodec::client().encode(&frame).unwrap();
        let (decoded, consumed) = FrameCodec::server()
            .decode(&encoded)
            .unwrap()
            .expect("complete frame");
        assert_eq!(consumed, encoded.len());
        assert!(decoded.fin);
        assert_eq!(decoded.opcode, OpCode::Binary);
        assert_eq!(decoded.payload, payload);
        (encoded, consumed)
    }

    #[test]
    fn test_roundtrip_length_boundaries() {
        // (payload size, expected header size incl. mask key)
        for (len, header) in [
            (0, 2 + 4),
            (125, 2 + 4),
            (126, 2 + 2 + 4),
            (65535, 2 + 2 + 4),
            (65536, 2 + 8 + 4),
            (3 * 1024 * 1024, 2 + 8 + 4),
        ] {
            let (encoded, _) = roundtrip(len);
            assert_eq!(encoded.len(), header + len, "payload len {len}");
        }
    }

    #[test]
    fn test_server_to_client_frames_are_unmasked() {
        let encoded = FrameCodec::server().encode(&Frame::text("hi")).unwrap();
        assert_eq!(encoded[1] & 0x80, 0);
        let (frame, _) = FrameCodec::client().decode(&encoded).unwrap().unwrap();
        assert_eq!(frame.payload, &b"hi"[..]);
        assert!(frame.mask.is_none());
    }

    #[test]
    fn test_partial_frame_needs_more_data_without_consuming() {
        let encoded = FrameCodec::server()
            .encode(&Frame::binary(vec![7u8; 300]))
            .unwrap();
        let codec = FrameCodec::client();
        for cut in [0, 1, 2, 3, 150, encoded.len() - 1] {
            assert!(codec.decode(&encoded[..cut]).unwrap().is_none(), "cut {cut}");
            // Retry with the same prefix is idempotent.
            assert!(codec.decode(&encoded[..cut]).unwrap().is_none(), "cut {cut}");
        }
        let (_, consumed) = codec.decode(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let a = FrameCodec::server().encode(&Frame::text("one")).unwrap();
        let b = FrameCodec::server().encode(&Frame::text("two")).unwrap();
        let mut buf = a.to_vec();
        buf.extend_from_slice(&b);

        let codec = FrameCodec::client();
        let (first, consumed) = codec.decode(&buf).unwrap().unwrap();
        assert_eq!(first.payload, &b"one"[..]);
        let (second, _) = codec.decode(&buf[consumed..]).unwrap().unwrap();
        assert_eq!(second.payload, &b"two"[..]);
    }

    #[test]
    fn test_masked_frame_rejected_by_client_role() {
        // A client-encoded (masked) frame arriving at a client is a
        // protocol violation.
        let masked = FrameCodec::client().encode(&Frame::text("x")).unwrap();
        let codec = FrameCodec::client();
        let err = codec.decode(&masked).unwrap_err();
        assert_eq!(err.code, CloseCode::PROTOCOL_ERROR.0);
        // The error is stateless: the same buffer fails identically.
        assert_eq!(codec.decode(&masked).unwrap_err(), err);
    }

    #[test]
    fn test_unmasked_frame_rejected_by_server_role() {
        let unmasked = FrameCodec::server().encode(&Frame::text("x")).unwrap();
        let err = FrameCodec::server().decode(&unmasked).unwrap_err();
        assert_eq!(err.code, CloseCode::PROTOCOL_ERROR.0);
    }

    #[test]
    fn test_reserved_opcode_rejected() {
        let err = FrameCodec::client().decode(&[0x83, 0x00]).unwrap_err();
        assert_eq!(err.code, CloseCode::PROTOCOL_ERROR.0);
    }

    #[test]
    fn test_rsv_bits_rejected_without_negotiation() {
        // FIN + RSV1 + text opcode.
        let err = FrameCodec::client().decode(&[0xC1, 0x00]).unwrap_err();
        assert_eq!(err.code, CloseCode::PROTOCOL_ERROR.0);

        let mut codec = FrameCodec::client();
        codec.set_accept_compressed(true);
        let (frame, _) = codec.decode(&[0xC1, 0x00]).unwrap().unwrap();
        assert!(frame.compressed);
        // RSV2 stays invalid even with compression negotiated.
        assert!(codec.decode(&[0xA1, 0x00]).is_err());
    }

    #[test]
    fn test_oversized_control_frame_rejected() {
        let err = FrameCodec::client()
            .encode(&Frame::ping(vec![0u8; 126]))
            .unwrap_err();
        assert_eq!(err.code, CloseCode::PROTOCOL_ERROR.0);

        // Wire-level: ping with 7-bit length 126 marker.
        let err = FrameCodec::client().decode(&[0x89, 126, 0x00, 0x7E]).unwrap_err();
        assert_eq!(err.code, CloseCode::PROTOCOL_ERROR.0);
    }

    #[test]
    fn test_fragmented_control_frame_rejected() {
        // Ping without FIN.
        let err = FrameCodec::client().decode(&[0x09, 0x00]).unwrap_err();
        assert_eq!(err.code, CloseCode::PROTOCOL_ERROR.0);
    }

    #[test]
    fn test_mask_is_rotating_xor() {
        let mut data = *b"abcdefgh";
        apply_mask(&mut data, [1, 2, 3, 4]);
        assert_eq!(
            data,
            [b'a' ^ 1, b'b' ^ 2, b'c' ^ 3, b'd' ^ 4, b'e' ^ 1, b'f' ^ 2, b'g' ^ 3, b'h' ^ 4]
        );
        apply_mask(&mut data, [1, 2, 3, 4]);
        assert_eq!(&data, b"abcdefgh");
    }
}
