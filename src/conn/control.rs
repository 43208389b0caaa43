//! Control-frame payload handling.

use crate::base::closecode::CloseCode;

/// Status code and reason parsed from a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClosePayload {
    pub code: CloseCode,
    pub reason: String,
}

/// Parses a close-frame payload.
///
/// An empty payload means no status was received (1005). A payload that
/// cannot be parsed (single byte, or a reason that is not UTF-8) yields
/// protocol error (1002) rather than failing the close sequence.
pub(crate) fn parse_close_payload(payload: &[u8]) -> ClosePayload {
    if payload.is_empty() {
        return ClosePayload {
            code: CloseCode::NO_STATUS,
            reason: String::new(),
        };
    }
    if payload.len() < 2 {
        return ClosePayload {
            code: CloseCode::PROTOCOL_ERROR,
            reason: String::new(),
        };
    }
    let code = CloseCode(u16::from_be_bytes([payload[0], payload[1]]));
    match std::str::from_utf8(&payload[2..]) {
        Ok(reason) => ClosePayload {
            code,
            reason: reason.to_string(),
        },
        Err(_) => ClosePayload {
            code: CloseCode::PROTOCOL_ERROR,
            reason: String::new(),
        },
    }
}

/// Close code actually emitted for a caller-requested code: reserved and
/// synthetic codes are replaced with normal closure.
pub(crate) fn sendable_close_code(code: u16) -> CloseCode {
    let code = CloseCode(code);
    if code.is_sendable() {
        code
    } else {
        CloseCode::NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_payload_code_without_reason() {
        let parsed = parse_close_payload(b"\x03\xE8");
        assert_eq!(parsed.code, CloseCode::NORMAL);
        assert_eq!(parsed.reason, "");
    }

    #[test]
    fn test_close_payload_with_reason() {
        let parsed = parse_close_payload(b"\x03\xE9going away");
        assert_eq!(parsed.code, CloseCode::GOING_AWAY);
        assert_eq!(parsed.reason, "going away");
    }

    #[test]
    fn test_empty_close_payload_means_no_status() {
        assert_eq!(parse_close_payload(b"").code, CloseCode::NO_STATUS);
    }

    #[test]
    fn test_malformed_close_payload_degrades_to_protocol_error() {
        assert_eq!(parse_close_payload(b"\x03").code, CloseCode::PROTOCOL_ERROR);
        assert_eq!(
            parse_close_payload(b"\x03\xE8\xFF\xFE").code,
            CloseCode::PROTOCOL_ERROR
        );
    }

    #[test]
    fn test_unmapped_codes_preserved() {
        assert_eq!(parse_close_payload(b"\x0F\xA0").code, CloseCode(4000));
    }

    #[test]
    fn test_sendable_substitution() {
        assert_eq!(sendable_close_code(1001), CloseCode::GOING_AWAY);
        assert_eq!(sendable_close_code(1005), CloseCode::NORMAL);
        assert_eq!(sendable_close_code(1006), CloseCode::NORMAL);
    }
}
