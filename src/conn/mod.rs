//! Connection state machine and event loop.
//!
//! One tokio task per connection drives the upgrade handshake and then a
//! single event loop over three sources: transport reads, the caller's
//! command channel (writes and disconnects, FIFO), and the optional close
//! timer. Because the loop is the only place frames are processed, no two
//! frames for a connection are ever handled concurrently, which is what
//! keeps reassembly and state transitions safe without locks.

pub mod assembler;
pub(crate) mod control;

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Sleep;
use url::Url;

use crate::base::closecode::CloseCode;
use crate::base::wserror::{ErrorKind, WsError};
use crate::client::WebSocketDelegate;
use crate::conn::assembler::{Message, MessageAssembler};
use crate::conn::control::{parse_close_payload, sendable_close_code, ClosePayload};
use crate::frame::codec::FrameCodec;
use crate::frame::{Frame, OpCode};
use crate::handshake::{find_terminator, parse_response, validate_response};
use crate::handshake::{HandshakeRequest, HandshakeResponse};
use crate::socket::stream::BoxedTransport;

/// Upper bound on the upgrade response head.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

/// Longest close reason that still fits a control frame with its 2-byte code.
const MAX_CLOSE_REASON: usize = 123;

/// Connection lifecycle. `Closed` is terminal.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnState::Connecting,
            1 => ConnState::Open,
            2 => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }
}

/// State visible to the facade while the connection task runs.
pub(crate) struct SharedState {
    state: AtomicU8,
    protocol: Mutex<Option<String>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnState::Closed as u8),
            protocol: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ConnState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn protocol(&self) -> Option<String> {
        self.protocol
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_protocol(&self, protocol: Option<String>) {
        *self.protocol.lock().unwrap_or_else(|e| e.into_inner()) = protocol;
    }
}

/// Completion callback for a queued write.
pub type WriteCompletion = Box<dyn FnOnce(Result<(), WsError>) + Send + 'static>;

/// Slot holding the caller's non-owning delegate reference.
pub(crate) type DelegateSlot = Arc<RwLock<Option<Weak<dyn WebSocketDelegate>>>>;

pub(crate) enum Command {
    Write {
        frame: Frame,
        completion: Option<WriteCompletion>,
    },
    Disconnect {
        force_timeout: Option<Duration>,
        close_code: u16,
    },
}

/// Per-connection settings snapshot taken at `connect()` time.
#[derive(Debug, Clone)]
pub(crate) struct ConnSettings {
    pub max_message_size: usize,
    pub write_timeout: Option<Duration>,
    pub offer_deflate: bool,
    pub protocols: Vec<String>,
    pub headers: http::HeaderMap,
}

/// A live connection, consumed by [`Connection::run`] on its own task.
pub(crate) struct Connection {
    pub url: Url,
    pub settings: ConnSettings,
    pub transport: BoxedTransport,
    pub shared: Arc<SharedState>,
    pub delegate: DelegateSlot,
    pub commands: mpsc::UnboundedReceiver<Command>,
}

enum Event {
    Command(Option<Command>),
    Read(std::io::Result<usize>),
    CloseTimeout,
}

/// Whether the event loop keeps going after handling an event.
enum Flow {
    Continue,
    Ended,
}

impl Connection {
    pub(crate) async fn run(self) {
        let Connection {
            url,
            settings,
            mut transport,
            shared,
            delegate,
            mut commands,
        } = self;

        let mut core = Core {
            codec: FrameCodec::client(),
            assembler: MessageAssembler::new(settings.max_message_size),
            write_timeout: settings.write_timeout,
            shared,
            delegate,
            sent_close_code: None,
            finished: false,
        };
        let mut read_buf = BytesMut::with_capacity(8 * 1024);

        // Phase 1: upgrade handshake. Failures surface only through
        // on_disconnect; on_connect never fires.
        let request = match HandshakeRequest::new(url.clone()) {
            Ok(request) => request
                .protocols(&settings.protocols)
                .offer_deflate(settings.offer_deflate)
                .headers(settings.headers.clone()),
            Err(err) => {
                core.finish(Some(err));
                return;
            }
        };
        match run_handshake(&mut transport, &mut commands, &mut read_buf, &request, &settings).await
        {
            Ok(Some(response)) => {
                if let Err(err) = core.open(&url, &settings, &response) {
                    let _ = transport.shutdown().await;
                    core.finish(Some(err));
                    return;
                }
            }
            Ok(None) => {
                // Local disconnect while still connecting.
                let _ = transport.shutdown().await;
                core.finish(None);
                return;
            }
            Err(err) => {
                tracing::debug!(url = %url, error = %err, "handshake failed");
                let _ = transport.shutdown().await;
                core.finish(Some(err));
                return;
            }
        }

        // Frame bytes that arrived in the same read as the response head.
        if !read_buf.is_empty() {
            if let Flow::Ended = process_buffer(&mut core, &mut transport, &mut read_buf).await {
                return;
            }
        }

        // Phase 2: open loop.
        let mut close_timer: Option<Pin<Box<Sleep>>> = None;
        loop {
            let event = tokio::select! {
                cmd = commands.recv() => Event::Command(cmd),
                res = transport.read_buf(&mut read_buf) => Event::Read(res),
                _ = wait_for(&mut close_timer) => Event::CloseTimeout,
            };
            let flow = match event {
                Event::Command(None) => {
                    // The facade was dropped: close quietly.
                    if core.state() == ConnState::Open {
                        let close = Frame::close(CloseCode::NORMAL, b"");
                        let _ =
                            write_frame(&mut transport, &core.codec, &close, core.write_timeout)
                                .await;
                    }
                    let _ = transport.shutdown().await;
                    core.finish(None);
                    Flow::Ended
                }
                Event::Command(Some(cmd)) => {
                    handle_command(&mut core, &mut transport, &mut close_timer, cmd).await
                }
                Event::Read(Ok(0)) => handle_eof(&mut core, &mut transport).await,
                Event::Read(Ok(_)) => process_buffer(&mut core, &mut transport, &mut read_buf).await,
                Event::Read(Err(err)) => {
                    core.finish(Some(WsError::close(
                        format!("transport read failed: {err}"),
                        CloseCode::ABNORMAL.0,
                    )));
                    Flow::Ended
                }
                Event::CloseTimeout => {
                    tracing::debug!("close handshake timed out");
                    let _ = transport.shutdown().await;
                    core.finish(Some(WsError::close(
                        "timed out waiting for peer close frame",
                        core.sent_close_code.unwrap_or(CloseCode::ABNORMAL.0),
                    )));
                    Flow::Ended
                }
            };
            if let Flow::Ended = flow {
                return;
            }
        }
    }
}

struct Core {
    codec: FrameCodec,
    assembler: MessageAssembler,
    write_timeout: Option<Duration>,
    shared: Arc<SharedState>,
    delegate: DelegateSlot,
    sent_close_code: Option<u16>,
    finished: bool,
}

impl Core {
    fn state(&self) -> ConnState {
        self.shared.state()
    }

    fn set_state(&self, state: ConnState) {
        self.shared.set_state(state);
    }

    /// Applies a validated upgrade response and fires `on_connect`.
    fn open(
        &mut self,
        url: &Url,
        settings: &ConnSettings,
        response: &HandshakeResponse,
    ) -> Result<(), WsError> {
        if response.deflate_accepted() {
            if !settings.offer_deflate {
                return Err(WsError::upgrade("server accepted an unoffered extension"));
            }
            self.codec.set_accept_compressed(true);
        }
        self.shared
            .set_protocol(response.protocol().map(str::to_string));
        self.set_state(ConnState::Open);
        tracing::debug!(url = %url, protocol = ?response.protocol(), "websocket open");
        self.emit(|d| d.on_connect());
        Ok(())
    }

    /// Runs a callback against the delegate if the caller still holds it.
    /// The lock is released before user code runs.
    fn emit(&self, f: impl FnOnce(&dyn WebSocketDelegate)) {
        let upgraded = {
            let slot = self.delegate.read().unwrap_or_else(|e| e.into_inner());
            slot.as_ref().and_then(Weak::upgrade)
        };
        if let Some(delegate) = upgraded {
            f(&*delegate);
        }
    }

    /// Terminal transition: at most one `on_disconnect` per connection.
    fn finish(&mut self, error: Option<WsError>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.set_state(ConnState::Closed);
        tracing::debug!(error = ?error.as_ref().map(ToString::to_string), "websocket closed");
        self.emit(move |d| d.on_disconnect(error));
    }
}

async fn run_handshake(
    transport: &mut BoxedTransport,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    read_buf: &mut BytesMut,
    request: &HandshakeRequest,
    settings: &ConnSettings,
) -> Result<Option<HandshakeResponse>, WsError> {
    let raw = request.to_bytes();
    transport
        .write_all(&raw)
        .await
        .map_err(|e| WsError::upgrade(format!("handshake write failed: {e}")))?;

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Write { completion, .. }) => {
                    if let Some(done) = completion {
                        done(Err(WsError::close("connection is not open", 0)));
                    }
                }
                Some(Command::Disconnect { .. }) | None => return Ok(None),
            },
            res = transport.read_buf(read_buf) => {
                let n = res.map_err(|e| WsError::upgrade(format!("handshake read failed: {e}")))?;
                if n == 0 {
                    return Err(WsError::upgrade("connection closed during handshake"));
                }
                if let Some(end) = find_terminator(read_buf) {
                    // Anything past the head stays buffered for the frame
                    // decoder.
                    let head = read_buf.split_to(end);
                    let response = parse_response(&head)?;
                    validate_response(&response, request.key(), &settings.protocols)?;
                    return Ok(Some(response));
                }
                if read_buf.len() > MAX_RESPONSE_HEAD {
                    return Err(WsError::upgrade("response head too large"));
                }
            }
        }
    }
}

async fn handle_command(
    core: &mut Core,
    transport: &mut BoxedTransport,
    close_timer: &mut Option<Pin<Box<Sleep>>>,
    cmd: Command,
) -> Flow {
    match cmd {
        Command::Write { frame, completion } => {
            if core.state() != ConnState::Open {
                if let Some(done) = completion {
                    done(Err(WsError::close("connection is not open", 0)));
                }
                return Flow::Continue;
            }
            match write_frame(transport, &core.codec, &frame, core.write_timeout).await {
                Ok(()) => {
                    if let Some(done) = completion {
                        done(Ok(()));
                    }
                    Flow::Continue
                }
                Err(err) => {
                    if let Some(done) = completion {
                        done(Err(err.clone()));
                    }
                    let _ = transport.shutdown().await;
                    core.finish(Some(err));
                    Flow::Ended
                }
            }
        }
        Command::Disconnect {
            force_timeout,
            close_code,
        } => match core.state() {
            ConnState::Open => {
                let code = sendable_close_code(close_code);
                tracing::debug!(code = code.0, "initiating close handshake");
                let close = Frame::close(code, b"");
                if let Err(err) = write_frame(transport, &core.codec, &close, core.write_timeout).await
                {
                    let _ = transport.shutdown().await;
                    core.finish(Some(err));
                    return Flow::Ended;
                }
                core.sent_close_code = Some(code.0);
                core.set_state(ConnState::Closing);
                if let Some(timeout) = force_timeout {
                    *close_timer = Some(Box::pin(tokio::time::sleep(timeout)));
                }
                Flow::Continue
            }
            ConnState::Closing => {
                // A second disconnect may add the timeout the first lacked.
                if close_timer.is_none() {
                    if let Some(timeout) = force_timeout {
                        *close_timer = Some(Box::pin(tokio::time::sleep(timeout)));
                    }
                }
                Flow::Continue
            }
            _ => Flow::Continue,
        },
    }
}

async fn handle_eof(core: &mut Core, transport: &mut BoxedTransport) -> Flow {
    let _ = transport.shutdown().await;
    match core.state() {
        // EOF is an acceptable end to the close handshake.
        ConnState::Closing => core.finish(None),
        _ => core.finish(Some(WsError::close(
            "connection closed abnormally",
            CloseCode::ABNORMAL.0,
        ))),
    }
    Flow::Ended
}

async fn process_buffer(
    core: &mut Core,
    transport: &mut BoxedTransport,
    read_buf: &mut BytesMut,
) -> Flow {
    loop {
        match core.codec.decode(&read_buf[..]) {
            Ok(Some((frame, consumed))) => {
                read_buf.advance(consumed);
                if let Flow::Ended = handle_frame(core, transport, frame).await {
                    return Flow::Ended;
                }
            }
            Ok(None) => return Flow::Continue,
            Err(err) => return fail(core, transport, err).await,
        }
    }
}

async fn handle_frame(core: &mut Core, transport: &mut BoxedTransport, frame: Frame) -> Flow {
    if frame.compressed {
        // The extension was negotiated but payload transforms are not
        // serviced by this engine.
        let err = WsError::new(
            ErrorKind::Compression,
            "compressed frame cannot be serviced",
            CloseCode::UNSUPPORTED.0,
        );
        return fail(core, transport, err).await;
    }
    match frame.opcode {
        OpCode::Ping => {
            tracing::trace!(len = frame.payload.len(), "ping received");
            let pong = Frame::pong(frame.payload);
            match write_frame(transport, &core.codec, &pong, core.write_timeout).await {
                Ok(()) => Flow::Continue,
                Err(err) => {
                    let _ = transport.shutdown().await;
                    core.finish(Some(err));
                    Flow::Ended
                }
            }
        }
        OpCode::Pong => {
            tracing::trace!(len = frame.payload.len(), "pong received");
            let data = if frame.payload.is_empty() {
                None
            } else {
                Some(frame.payload)
            };
            core.emit(move |d| d.on_pong(data));
            Flow::Continue
        }
        OpCode::Close => handle_close(core, transport, &frame.payload).await,
        _ => match core.assembler.on_frame(frame) {
            Ok(Some(Message::Text(text))) => {
                core.emit(move |d| d.on_text_message(text));
                Flow::Continue
            }
            Ok(Some(Message::Binary(data))) => {
                core.emit(move |d| d.on_binary_message(data));
                Flow::Continue
            }
            Ok(None) => Flow::Continue,
            Err(err) => fail(core, transport, err).await,
        },
    }
}

async fn handle_close(core: &mut Core, transport: &mut BoxedTransport, payload: &[u8]) -> Flow {
    let parsed = parse_close_payload(payload);
    tracing::debug!(code = parsed.code.0, reason = %parsed.reason, "close frame received");
    match core.state() {
        ConnState::Open => {
            // Peer-initiated close: echo, then drop the transport.
            core.set_state(ConnState::Closing);
            let echo = Frame::close(sendable_close_code(parsed.code.0), b"");
            let _ = write_frame(transport, &core.codec, &echo, core.write_timeout).await;
            let _ = transport.shutdown().await;
            core.finish(close_outcome(&parsed));
            Flow::Ended
        }
        ConnState::Closing => {
            // Peer acknowledged our close.
            let _ = transport.shutdown().await;
            core.finish(None);
            Flow::Ended
        }
        _ => Flow::Ended,
    }
}

fn close_outcome(parsed: &ClosePayload) -> Option<WsError> {
    match parsed.code {
        CloseCode::NORMAL | CloseCode::NO_STATUS => None,
        code => Some(WsError::close(
            if parsed.reason.is_empty() {
                code.reason().to_string()
            } else {
                parsed.reason.clone()
            },
            code.0,
        )),
    }
}

/// Best-effort failure close: tell the peer when a sendable code exists,
/// then tear down.
async fn fail(core: &mut Core, transport: &mut BoxedTransport, err: WsError) -> Flow {
    tracing::debug!(error = %err, "failing connection");
    let code = CloseCode(err.code);
    if code.is_sendable() {
        let reason = &err.message.as_bytes()[..err.message.len().min(MAX_CLOSE_REASON)];
        let close = Frame::close(code, reason);
        let _ = write_frame(transport, &core.codec, &close, core.write_timeout).await;
    }
    let _ = transport.shutdown().await;
    core.finish(Some(err));
    Flow::Ended
}

async fn write_frame(
    transport: &mut BoxedTransport,
    codec: &FrameCodec,
    frame: &Frame,
    timeout: Option<Duration>,
) -> Result<(), WsError> {
    let bytes = codec.encode(frame)?;
    match timeout {
        Some(limit) => tokio::time::timeout(limit, transport.write_all(&bytes))
            .await
            .map_err(|_| WsError::write_timeout(format!("write stalled for {limit:?}")))?
            .map_err(|e| WsError::write(format!("transport write failed: {e}"))),
        None => transport
            .write_all(&bytes)
            .await
            .map_err(|e| WsError::write(format!("transport write failed: {e}"))),
    }
}

async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_u8_roundtrip() {
        for state in [
            ConnState::Connecting,
            ConnState::Open,
            ConnState::Closing,
            ConnState::Closed,
        ] {
            assert_eq!(ConnState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_shared_state_starts_closed() {
        let shared = SharedState::new();
        assert_eq!(shared.state(), ConnState::Closed);
        shared.set_state(ConnState::Open);
        assert_eq!(shared.state(), ConnState::Open);
    }

    #[test]
    fn test_close_outcome_normal_codes_are_clean() {
        let clean = ClosePayload {
            code: CloseCode::NORMAL,
            reason: String::new(),
        };
        assert!(close_outcome(&clean).is_none());

        let no_status = ClosePayload {
            code: CloseCode::NO_STATUS,
            reason: String::new(),
        };
        assert!(close_outcome(&no_status).is_none());

        let going_away = ClosePayload {
            code: CloseCode::GOING_AWAY,
            reason: "maintenance".to_string(),
        };
        let err = close_outcome(&going_away).unwrap();
        assert_eq!(err.kind, ErrorKind::Close);
        assert_eq!(err.code, 1001);
        assert_eq!(err.message, "maintenance");
    }
}
