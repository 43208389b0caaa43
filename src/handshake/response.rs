//! Upgrade response parsing and validation.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use super::request::accept_key;
use crate::base::wserror::WsError;

/// A parsed upgrade response.
#[derive(Debug)]
pub struct HandshakeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl HandshakeResponse {
    fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The subprotocol the server selected, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.header_str("sec-websocket-protocol")
    }

    /// Whether the server accepted a permessage-deflate offer.
    pub fn deflate_accepted(&self) -> bool {
        self.header_str("sec-websocket-extensions")
            .is_some_and(|v| v.to_ascii_lowercase().contains("permessage-deflate"))
    }
}

/// Locates the end of the response head in a read buffer.
///
/// Returns the index one past the `\r\n\r\n` terminator, so reads can
/// accumulate until the head is complete and leave any trailing frame bytes
/// untouched.
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Parses the response head (status line + headers).
///
/// `raw` must span exactly the head, terminator included. Header names are
/// stored in an [`HeaderMap`], which makes every later lookup
/// case-insensitive.
pub fn parse_response(raw: &[u8]) -> Result<HandshakeResponse, WsError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| WsError::upgrade("response head is not valid UTF-8"))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .ok_or_else(|| WsError::upgrade("empty response"))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(WsError::upgrade(format!("not an HTTP response: {status_line}")));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| WsError::upgrade(format!("malformed status line: {status_line}")))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| WsError::upgrade(format!("malformed header line: {line}")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| WsError::upgrade(format!("invalid header name: {line}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| WsError::upgrade(format!("invalid header value: {line}")))?;
        headers.append(name, value);
    }

    Ok(HandshakeResponse { status, headers })
}

/// Validates a parsed response against the sent key and offer.
///
/// Requires status 101, `Upgrade: websocket` (case-insensitive),
/// `Connection` containing `upgrade`, and a `Sec-WebSocket-Accept` equal to
/// the RFC 6455 challenge over `sent_key`. A selected subprotocol that was
/// never offered also fails.
pub fn validate_response(
    response: &HandshakeResponse,
    sent_key: &str,
    offered_protocols: &[String],
) -> Result<(), WsError> {
    if response.status != StatusCode::SWITCHING_PROTOCOLS {
        return Err(WsError::upgrade(format!(
            "expected 101 Switching Protocols, got {}",
            response.status
        )));
    }

    let upgrade = response.header_str("upgrade").unwrap_or_default();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(WsError::upgrade(format!("bad Upgrade header: {upgrade:?}")));
    }

    let connection = response.header_str("connection").unwrap_or_default();
    if !connection.to_ascii_lowercase().contains("upgrade") {
        return Err(WsError::upgrade(format!(
            "bad Connection header: {connection:?}"
        )));
    }

    let accept = response.header_str("sec-websocket-accept").unwrap_or_default();
    let expected = accept_key(sent_key);
    if accept != expected {
        return Err(WsError::upgrade("Sec-WebSocket-Accept mismatch"));
    }

    if let Some(selected) = response.protocol() {
        if !offered_protocols.iter().any(|p| p == selected) {
            return Err(WsError::upgrade(format!(
                "server selected unoffered subprotocol {selected:?}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::wserror::ErrorKind;

    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn valid_head() -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(KEY)
        )
    }

    #[test]
    fn test_terminator_detection() {
        assert_eq!(find_terminator(b"HTTP/1.1 101"), None);
        assert_eq!(find_terminator(b"a\r\n\r\n"), Some(5));
        // Frame bytes after the head are not part of the terminator span.
        assert_eq!(find_terminator(b"a\r\n\r\n\x81\x02hi"), Some(5));
    }

    #[test]
    fn test_valid_response_passes() {
        let resp = parse_response(valid_head().as_bytes()).unwrap();
        assert_eq!(resp.status, StatusCode::SWITCHING_PROTOCOLS);
        validate_response(&resp, KEY, &[]).unwrap();
    }

    #[test]
    fn test_header_match_is_case_insensitive() {
        let head = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             UPGRADE: WebSocket\r\n\
             connection: keep-alive, Upgrade\r\n\
             sec-websocket-accept: {}\r\n\r\n",
            accept_key(KEY)
        );
        let resp = parse_response(head.as_bytes()).unwrap();
        validate_response(&resp, KEY, &[]).unwrap();
    }

    #[test]
    fn test_non_101_status_fails() {
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
        let resp = parse_response(head.as_bytes()).unwrap();
        let err = validate_response(&resp, KEY, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upgrade);
    }

    #[test]
    fn test_wrong_accept_fails() {
        let head = "HTTP/1.1 101 Switching Protocols\r\n\
                    Upgrade: websocket\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBrZXk=\r\n\r\n";
        let resp = parse_response(head.as_bytes()).unwrap();
        let err = validate_response(&resp, KEY, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upgrade);
    }

    #[test]
    fn test_missing_upgrade_header_fails() {
        let head = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(KEY)
        );
        let resp = parse_response(head.as_bytes()).unwrap();
        assert!(validate_response(&resp, KEY, &[]).is_err());
    }

    #[test]
    fn test_unoffered_subprotocol_fails() {
        let head = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Protocol: chat\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(KEY)
        );
        let resp = parse_response(head.as_bytes()).unwrap();
        assert!(validate_response(&resp, KEY, &[]).is_err());
        validate_response(&resp, KEY, &["chat".to_string()]).unwrap();
    }

    #[test]
    fn test_deflate_acceptance_detection() {
        let head = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Extensions: permessage-deflate; server_no_context_takeover\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(KEY)
        );
        let resp = parse_response(head.as_bytes()).unwrap();
        assert!(resp.deflate_accepted());
        assert!(!parse_response(valid_head().as_bytes()).unwrap().deflate_accepted());
    }
}
