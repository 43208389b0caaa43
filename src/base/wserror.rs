use thiserror::Error;

/// Classifies a [`WsError`].
///
/// The set mirrors the error surface of the client contract: transport
/// write failures, compression-layer failures, TLS trust failures, write
/// timeouts, frame-parse failures, HTTP upgrade failures, and close-sequence
/// failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Output stream error during write.
    #[error("output stream write error")]
    OutputStreamWrite,
    /// The compression layer failed or produced data the engine cannot service.
    #[error("compression error")]
    Compression,
    /// Invalid SSL certificate or trust validation failure.
    #[error("invalid SSL certificate")]
    InvalidSsl,
    /// The socket timed out waiting to be ready to write.
    #[error("write timeout")]
    WriteTimeout,
    /// There was an error parsing the WebSocket frames.
    #[error("protocol error")]
    Protocol,
    /// There was an error during the HTTP upgrade.
    #[error("upgrade error")]
    Upgrade,
    /// There was an error during the close sequence.
    #[error("close error")]
    Close,
}

/// A WebSocket engine error: a kind, a human-readable message, and a numeric
/// code.
///
/// For protocol-level failures the code is the RFC 6455 close code that was
/// (or would be) sent to the peer; for transport-level failures it is 0.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message} (code: {code})")]
pub struct WsError {
    pub kind: ErrorKind,
    pub message: String,
    pub code: u16,
}

impl WsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, code: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            code,
        }
    }

    /// A frame-parse failure carrying the close code sent to the peer.
    pub fn protocol(message: impl Into<String>, code: u16) -> Self {
        Self::new(ErrorKind::Protocol, message, code)
    }

    /// An HTTP upgrade failure.
    pub fn upgrade(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upgrade, message, 0)
    }

    /// A close-sequence failure.
    pub fn close(message: impl Into<String>, code: u16) -> Self {
        Self::new(ErrorKind::Close, message, code)
    }

    /// A transport write failure.
    pub fn write(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutputStreamWrite, message, 0)
    }

    /// A write that expired before the transport became ready.
    pub fn write_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WriteTimeout, message, 0)
    }

    /// A TLS trust or certificate failure.
    pub fn invalid_ssl(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSsl, message, 0)
    }

    /// A compression-layer failure.
    pub fn compression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compression, message, 0)
    }
}

impl From<std::io::Error> for WsError {
    fn from(err: std::io::Error) -> Self {
        WsError::write(err.to_string())
    }
}
