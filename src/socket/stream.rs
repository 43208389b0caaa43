//! Transport abstraction for polymorphic byte streams.
//!
//! This module provides a `Transport` trait that allows uniform handling of
//! the stream types a connection can run on: plain TCP, TLS over TCP, and
//! in-memory pipes injected by tests.

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

/// A byte stream the protocol engine can drive.
///
/// Anything async-readable and async-writable qualifies; the engine never
/// looks below this seam, which is what makes a fake in-memory transport a
/// drop-in replacement for a socket in tests.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

impl Transport for TcpStream {}

impl<S: Transport> Transport for SslStream<S> {}

// In-memory pipe, used to inject a scripted peer.
impl Transport for DuplexStream {}

/// A wrapper type for a boxed dynamic Transport that is object-safe.
/// This avoids conflicting trait implementations with tokio's blanket impls.
pub struct BoxedTransport {
    inner: Pin<Box<dyn Transport>>,
}

impl BoxedTransport {
    /// Create a new BoxedTransport from any Transport.
    pub fn new<S: Transport>(transport: S) -> Self {
        Self {
            inner: Box::pin(transport),
        }
    }
}

impl std::fmt::Debug for BoxedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxedTransport")
    }
}

impl AsyncRead for BoxedTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxedTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}

impl Unpin for BoxedTransport {}
