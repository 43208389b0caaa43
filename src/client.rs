//! WebSocket client with builder pattern.
//!
//! Provides the public contract of the engine: connect, disconnect, write,
//! and delegate callbacks for connection events.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsnet::{WebSocketClient, WebSocketDelegate};
//!
//! struct Echo;
//!
//! impl WebSocketDelegate for Echo {
//!     fn on_connect(&self) {
//!         println!("connected");
//!     }
//!     fn on_text_message(&self, text: String) {
//!         println!("got: {text}");
//!     }
//! }
//!
//! let client = WebSocketClient::builder("wss://echo.example.com/ws").build()?;
//! let delegate = Arc::new(Echo);
//! client.set_delegate(&delegate);
//! client.connect();
//! ```

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

use crate::base::wserror::WsError;
use crate::conn::{
    Command, ConnSettings, ConnState, Connection, DelegateSlot, SharedState, WriteCompletion,
};
use crate::frame::Frame;
use crate::socket::connectjob::ConnectJob;
use crate::socket::stream::BoxedTransport;
use crate::socket::tls::TlsConfig;

const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Observer for connection events.
///
/// Held by the client as a non-owning reference: once the caller drops its
/// `Arc`, later events are silently discarded. All callbacks fire on the
/// connection's own task, one at a time, in arrival order.
pub trait WebSocketDelegate: Send + Sync {
    /// The upgrade handshake completed and the connection is open.
    fn on_connect(&self) {}

    /// The connection reached its terminal state. `error` is `None` for a
    /// clean close.
    fn on_disconnect(&self, _error: Option<WsError>) {}

    /// A complete text message arrived.
    fn on_text_message(&self, _text: String) {}

    /// A complete binary message arrived.
    fn on_binary_message(&self, _data: Bytes) {}

    /// A pong arrived, solicited or not. `None` when the pong carried no
    /// payload.
    fn on_pong(&self, _data: Option<Bytes>) {}
}

/// Builder for a [`WebSocketClient`].
pub struct WebSocketBuilder {
    url: String,
    headers: http::HeaderMap,
    protocols: Vec<String>,
    tls: TlsConfig,
    max_message_size: usize,
    write_timeout: Option<Duration>,
    enable_compression: bool,
    transport: Option<BoxedTransport>,
}

impl WebSocketBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: http::HeaderMap::new(),
            protocols: Vec::new(),
            tls: TlsConfig::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            write_timeout: None,
            enable_compression: false,
            transport: None,
        }
    }

    /// Add a header to the upgrade request.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::try_from(name),
            http::header::HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Offer a subprotocol.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// TLS trust settings for `wss` connections.
    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Maximum reassembled message size. Exceeding it closes the connection
    /// with code 1009.
    pub fn max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    /// Time limit for each transport write.
    pub fn write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = Some(limit);
        self
    }

    /// Offer the permessage-deflate extension in the handshake.
    pub fn enable_compression(mut self, enable: bool) -> Self {
        self.enable_compression = enable;
        self
    }

    /// Use a pre-connected transport instead of dialing the URL host.
    ///
    /// This is the injection seam for tests: an in-memory duplex stream
    /// stands in for the socket and the engine cannot tell the difference.
    pub fn transport(mut self, transport: BoxedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<WebSocketClient, WsError> {
        let url = Url::parse(&self.url)
            .map_err(|e| WsError::upgrade(format!("invalid URL: {e}")))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(WsError::upgrade(format!(
                "unsupported URL scheme {:?}",
                url.scheme()
            )));
        }
        Ok(WebSocketClient {
            url,
            tls: self.tls,
            settings: ConnSettings {
                max_message_size: self.max_message_size,
                write_timeout: self.write_timeout,
                offer_deflate: self.enable_compression,
                protocols: self.protocols,
                headers: self.headers,
            },
            delegate: Arc::new(std::sync::RwLock::new(None)),
            shared: Arc::new(SharedState::new()),
            cmd_tx: Mutex::new(None),
            injected: Mutex::new(self.transport),
        })
    }
}

/// A WebSocket client connection handle.
///
/// `connect` spawns the connection task; everything after that is driven by
/// events. None of the methods block: outcomes arrive through the delegate
/// and through per-write completion callbacks.
///
/// A `write` issued while the connection is not open never silently
/// succeeds — its completion is invoked immediately with a close error and
/// the payload is dropped.
pub struct WebSocketClient {
    url: Url,
    tls: TlsConfig,
    settings: ConnSettings,
    delegate: DelegateSlot,
    shared: Arc<SharedState>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    injected: Mutex<Option<BoxedTransport>>,
}

impl WebSocketClient {
    /// Create a client builder.
    pub fn builder(url: impl Into<String>) -> WebSocketBuilder {
        WebSocketBuilder::new(url)
    }

    /// The URL this client connects to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Install the event observer. The client keeps only a weak reference.
    pub fn set_delegate<D: WebSocketDelegate + 'static>(&self, delegate: &Arc<D>) {
        let delegate: Arc<dyn WebSocketDelegate> = delegate.clone();
        let weak: Weak<dyn WebSocketDelegate> = Arc::downgrade(&delegate);
        *self.delegate.write().unwrap_or_else(|e| e.into_inner()) = Some(weak);
    }

    /// Whether the connection is open (handshake complete, close not begun).
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnState::Open
    }

    /// The subprotocol the server selected, once open.
    pub fn negotiated_protocol(&self) -> Option<String> {
        self.shared.protocol()
    }

    /// Start connecting. One transport attempt per call; progress and
    /// failure are reported through the delegate. Calling while a
    /// connection is already active does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if matches!(
            self.shared.state(),
            ConnState::Connecting | ConnState::Open | ConnState::Closing
        ) {
            tracing::debug!(url = %self.url, "connect ignored: connection already active");
            return;
        }
        self.shared.set_state(ConnState::Connecting);

        let (tx, rx) = mpsc::unbounded_channel();
        *self.cmd_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);

        let url = self.url.clone();
        let tls = self.tls.clone();
        let settings = self.settings.clone();
        let shared = self.shared.clone();
        let delegate = self.delegate.clone();
        let injected = self
            .injected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        tokio::spawn(async move {
            let transport = match injected {
                Some(transport) => transport,
                None => match ConnectJob::connect(&url, &tls).await {
                    Ok(transport) => transport,
                    Err(err) => {
                        tracing::debug!(url = %url, error = %err, "transport connect failed");
                        shared.set_state(ConnState::Closed);
                        emit_disconnect(&delegate, Some(err));
                        return;
                    }
                },
            };
            Connection {
                url,
                settings,
                transport,
                shared,
                delegate,
                commands: rx,
            }
            .run()
            .await;
        });
    }

    /// Begin the close handshake with the given close code.
    ///
    /// Without `force_timeout` the connection waits indefinitely for the
    /// peer's close frame (or EOF). With it, a timer is armed: whichever of
    /// peer close and timer comes first wins, and the timer path surfaces a
    /// close error through `on_disconnect`.
    pub fn disconnect(&self, force_timeout: Option<Duration>, close_code: u16) {
        let guard = self.cmd_tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(Command::Disconnect {
                force_timeout,
                close_code,
            });
        }
    }

    /// Queue a binary message. The completion fires after the payload
    /// reaches the transport, in submission order.
    pub fn write(&self, data: impl Into<Bytes>, completion: Option<WriteCompletion>) {
        self.send_frame(Frame::binary(data.into()), completion);
    }

    /// Queue a text message.
    pub fn write_text(&self, text: impl Into<String>, completion: Option<WriteCompletion>) {
        self.send_frame(Frame::text(text.into()), completion);
    }

    /// Queue a ping. The peer's pong arrives via
    /// [`WebSocketDelegate::on_pong`].
    pub fn write_ping(&self, data: impl Into<Bytes>, completion: Option<WriteCompletion>) {
        self.send_frame(Frame::ping(data.into()), completion);
    }

    fn send_frame(&self, frame: Frame, completion: Option<WriteCompletion>) {
        if self.shared.state() != ConnState::Open {
            if let Some(done) = completion {
                done(Err(WsError::close("connection is not open", 0)));
            }
            return;
        }
        let guard = self.cmd_tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            if let Some(done) = completion {
                done(Err(WsError::close("connection is not open", 0)));
            }
            return;
        };
        if let Err(mpsc::error::SendError(cmd)) = tx.send(Command::Write { frame, completion }) {
            // The connection task is gone; honor the write policy anyway.
            if let Command::Write {
                completion: Some(done),
                ..
            } = cmd
            {
                done(Err(WsError::close("connection is not open", 0)));
            }
        }
    }
}

fn emit_disconnect(delegate: &DelegateSlot, error: Option<WsError>) {
    let upgraded = {
        let slot = delegate.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().and_then(Weak::upgrade)
    };
    if let Some(delegate) = upgraded {
        delegate.on_disconnect(error);
    }
}
