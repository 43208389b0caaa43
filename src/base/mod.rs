//! Base types and error handling.
//!
//! Provides the foundational types shared by every layer of the engine:
//! - [`WsError`]: error kinds with human-readable messages and numeric codes
//! - [`CloseCode`]: RFC 6455 close status codes
//!
//! [`WsError`]: wserror::WsError
//! [`CloseCode`]: closecode::CloseCode

pub mod closecode;
pub mod wserror;
