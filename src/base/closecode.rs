//! WebSocket close codes (RFC 6455 section 7.4).

/// A 16-bit close status communicated in a close frame.
///
/// Codes received from the peer are preserved numerically even when they do
/// not map to a named constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure
    pub const NORMAL: Self = Self(1000);
    /// Endpoint going away
    pub const GOING_AWAY: Self = Self(1001);
    /// Protocol error
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Unhandled data type
    pub const UNSUPPORTED: Self = Self(1003);
    /// No status code present in the close frame (never sent on the wire)
    pub const NO_STATUS: Self = Self(1005);
    /// Connection dropped without a close frame (never sent on the wire)
    pub const ABNORMAL: Self = Self(1006);
    /// Payload not consistent with the message type (e.g. malformed UTF-8)
    pub const ENCODING: Self = Self(1007);
    /// Policy violation
    pub const POLICY_VIOLATED: Self = Self(1008);
    /// Message too big
    pub const MESSAGE_TOO_BIG: Self = Self(1009);

    /// Whether this code may appear in an outgoing close frame.
    ///
    /// 1004 is reserved and 1005/1006 are synthetic codes that only describe
    /// local observations, so none of them are ever emitted.
    pub fn is_sendable(&self) -> bool {
        matches!(self.0, 1000..=1003 | 1007..=1009)
    }

    /// Human-readable description for the named codes.
    pub fn reason(&self) -> &'static str {
        match self.0 {
            1000 => "normal closure",
            1001 => "going away",
            1002 => "protocol error",
            1003 => "unsupported data type",
            1005 => "no status received",
            1006 => "abnormal closure",
            1007 => "invalid payload encoding",
            1008 => "policy violated",
            1009 => "message too big",
            _ => "unknown close code",
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.reason())
    }
}
