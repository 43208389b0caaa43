//! # wsnet
//!
//! An RFC 6455 WebSocket client engine for Rust.
//!
//! `wsnet` implements the full client side of the WebSocket protocol —
//! upgrade handshake, frame codec, message reassembly, and control-frame
//! handling — on top of a pluggable byte-stream transport with BoringSSL
//! TLS.
//!
//! ## Features
//!
//! - **Frame Codec**: incremental RFC 6455 decoding, client-side masking
//! - **Handshake**: HTTP/1.1 upgrade with `Sec-WebSocket-Accept` validation
//! - **State Machine**: Connecting → Open → Closing → Closed, one task per
//!   connection, no concurrent frame processing
//! - **Reassembly**: fragmented messages with a configurable size limit
//! - **Control Frames**: automatic pong echo, close-code semantics
//! - **TLS Trust**: disable validation, pin hostname, custom validators,
//!   cipher-suite restriction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsnet::{WebSocketClient, WebSocketDelegate};
//!
//! struct Printer;
//!
//! impl WebSocketDelegate for Printer {
//!     fn on_text_message(&self, text: String) {
//!         println!("{text}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = WebSocketClient::builder("wss://example.com/feed")
//!         .protocol("json")
//!         .build()
//!         .unwrap();
//!     let delegate = Arc::new(Printer);
//!     client.set_delegate(&delegate);
//!     client.connect();
//!     // ... events arrive on the delegate
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error kinds and close codes
//! - [`frame`] - Frame types and the wire codec
//! - [`handshake`] - HTTP upgrade request/response handling
//! - [`socket`] - Transport trait, connect flow, and TLS trust settings
//! - [`conn`] - Connection state machine and event loop
//! - [`client`] - The public client facade

pub mod base;
pub mod client;
pub mod conn;
pub mod frame;
pub mod handshake;
pub mod socket;

pub use base::closecode::CloseCode;
pub use base::wserror::{ErrorKind, WsError};
pub use client::{WebSocketBuilder, WebSocketClient, WebSocketDelegate};
pub use conn::assembler::Message;
pub use conn::{ConnState, WriteCompletion};
pub use socket::stream::{BoxedTransport, Transport};
pub use socket::tls::{TlsConfig, TrustValidator};
