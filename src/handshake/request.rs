//! Upgrade request construction.

use base64::{engine::general_purpose, Engine as _};
use http::HeaderMap;
use url::Url;

use crate::base::wserror::WsError;

/// Fixed GUID appended to the nonce for the accept challenge
/// (RFC 6455 section 1.3).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the expected `Sec-WebSocket-Accept` value for a sent key:
/// `base64(SHA-1(key + GUID))`.
pub fn accept_key(key: &str) -> String {
    let mut input = Vec::with_capacity(key.len() + WEBSOCKET_GUID.len());
    input.extend_from_slice(key.as_bytes());
    input.extend_from_slice(WEBSOCKET_GUID.as_bytes());
    let digest = boring::sha::sha1(&input);
    general_purpose::STANDARD.encode(digest)
}

/// The client's GET upgrade request.
///
/// Carries the target URL, the random `Sec-WebSocket-Key` nonce, offered
/// subprotocols, the optional permessage-deflate offer, and any extra caller
/// headers.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    url: Url,
    key: String,
    protocols: Vec<String>,
    offer_deflate: bool,
    headers: HeaderMap,
}

impl HandshakeRequest {
    /// Creates a request for `url` with a fresh 16-byte random nonce.
    pub fn new(url: Url) -> Result<Self, WsError> {
        let mut nonce = [0u8; 16];
        boring::rand::rand_bytes(&mut nonce)
            .map_err(|e| WsError::upgrade(format!("key generation failed: {e}")))?;
        Ok(Self {
            url,
            key: general_purpose::STANDARD.encode(nonce),
            protocols: Vec::new(),
            offer_deflate: false,
            headers: HeaderMap::new(),
        })
    }

    /// The `Sec-WebSocket-Key` this request carries.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Subprotocols to offer via `Sec-WebSocket-Protocol`.
    pub fn protocols(mut self, protocols: &[String]) -> Self {
        self.protocols = protocols.to_vec();
        self
    }

    /// Offer the permessage-deflate extension.
    pub fn offer_deflate(mut self, offer: bool) -> Self {
        self.offer_deflate = offer;
        self
    }

    /// Extra headers appended after the handshake headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Serializes the request for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let path = match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        };
        let host = self.url.host_str().unwrap_or_default();
        // The url crate drops scheme-default ports, so an explicit port here
        // is always non-default.
        let host_header = match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let mut out = String::new();
        out.push_str(&format!("GET {path} HTTP/1.1\r\n"));
        out.push_str(&format!("Host: {host_header}\r\n"));
        out.push_str("Upgrade: websocket\r\n");
        out.push_str("Connection: Upgrade\r\n");
        out.push_str(&format!("Sec-WebSocket-Key: {}\r\n", self.key));
        out.push_str("Sec-WebSocket-Version: 13\r\n");
        if !self.protocols.is_empty() {
            out.push_str(&format!(
                "Sec-WebSocket-Protocol: {}\r\n",
                self.protocols.join(", ")
            ));
        }
        if self.offer_deflate {
            out.push_str("Sec-WebSocket-Extensions: permessage-deflate\r\n");
        }
        let mut bytes = out.into_bytes();
        for (name, value) in &self.headers {
            bytes.extend_from_slice(name.as_str().as_bytes());
            bytes.extend_from_slice(b": ");
            bytes.extend_from_slice(value.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(b"\r\n");
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_key_rfc_vector() {
        // The worked example from RFC 6455 section 1.3.
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_request_contains_handshake_headers() {
        let url = Url::parse("ws://example.com/chat?room=7").unwrap();
        let req = HandshakeRequest::new(url).unwrap();
        let raw = String::from_utf8(req.to_bytes()).unwrap();

        assert!(raw.starts_with("GET /chat?room=7 HTTP/1.1\r\n"));
        assert!(raw.contains("Host: example.com\r\n"));
        assert!(raw.contains("Upgrade: websocket\r\n"));
        assert!(raw.contains("Connection: Upgrade\r\n"));
        assert!(raw.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(raw.contains(&format!("Sec-WebSocket-Key: {}\r\n", req.key())));
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_request_key_is_16_random_bytes() {
        let url = Url::parse("ws://example.com/").unwrap();
        let a = HandshakeRequest::new(url.clone()).unwrap();
        let b = HandshakeRequest::new(url).unwrap();
        let decoded = general_purpose::STANDARD.decode(a.key()).unwrap();
        assert_eq!(decoded.len(), 16);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_non_default_port_in_host_header() {
        let url = Url::parse("ws://example.com:9001/").unwrap();
        let raw = String::from_utf8(HandshakeRequest::new(url).unwrap().to_bytes()).unwrap();
        assert!(raw.contains("Host: example.com:9001\r\n"));
    }

    #[test]
    fn test_protocols_and_deflate_offer() {
        let url = Url::parse("wss://example.com/").unwrap();
        let raw = String::from_utf8(
            HandshakeRequest::new(url)
                .unwrap()
                .protocols(&["graphql-ws".to_string(), "v2".to_string()])
                .offer_deflate(true)
                .to_bytes(),
        )
        .unwrap();
        assert!(raw.contains("Sec-WebSocket-Protocol: graphql-ws, v2\r\n"));
        assert!(raw.contains("Sec-WebSocket-Extensions: permessage-deflate\r\n"));
    }
}
