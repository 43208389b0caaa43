//! DNS → TCP → TLS connection flow.

use boring::ssl::{SslConnector, SslMethod};
use tokio::net::TcpStream;
use url::Url;

use crate::base::wserror::WsError;
use crate::socket::stream::BoxedTransport;
use crate::socket::tls::TlsConfig;

/// Manages the connection process for a WebSocket URL: resolve the host,
/// open a TCP stream, and wrap it in TLS when the scheme is `wss`.
pub struct ConnectJob;

impl ConnectJob {
    pub async fn connect(url: &Url, tls: &TlsConfig) -> Result<BoxedTransport, WsError> {
        let host = url
            .host_str()
            .ok_or_else(|| WsError::upgrade("URL has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| WsError::upgrade("URL has no port"))?;

        // 1. DNS resolution
        let addr_str = format!("{host}:{port}");
        tracing::debug!(host = %addr_str, "resolving");
        let addrs = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| WsError::upgrade(format!("name resolution failed: {e}")))?;

        // 2. TCP connect
        let mut stream = None;
        for addr in addrs {
            if let Ok(s) = TcpStream::connect(addr).await {
                stream = Some(s);
                break;
            }
        }
        let stream =
            stream.ok_or_else(|| WsError::upgrade(format!("connection to {addr_str} failed")))?;

        // 3. TLS handshake (wss only)
        if url.scheme() == "wss" {
            let server_name = tls.server_name(host);
            let mut builder = SslConnector::builder(SslMethod::tls())
                .map_err(|e| WsError::invalid_ssl(format!("SSL init failed: {e}")))?;
            tls.apply_to_builder(&mut builder, server_name)?;

            let connector = builder.build();
            let config = connector
                .configure()
                .map_err(|e| WsError::invalid_ssl(format!("SSL configure failed: {e}")))?;

            tracing::debug!(server_name = %server_name, "starting TLS handshake");
            let tls_stream = tokio_boring::connect(config, server_name, stream)
                .await
                .map_err(|e| WsError::invalid_ssl(format!("TLS handshake failed: {e}")))?;

            Ok(BoxedTransport::new(tls_stream))
        } else {
            Ok(BoxedTransport::new(stream))
        }
    }
}
