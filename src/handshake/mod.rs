//! HTTP/1.1 upgrade handshake.
//!
//! Builds the client's GET upgrade request and validates the server's
//! `101 Switching Protocols` response, including the `Sec-WebSocket-Accept`
//! challenge.

mod request;
mod response;

pub use request::{accept_key, HandshakeRequest, WEBSOCKET_GUID};
pub use response::{find_terminator, parse_response, validate_response, HandshakeResponse};
