//! Close codes and reasons.
//!
//! Protocol violations are fatal: the server sends a close frame with one of
//! these codes and stops reading. Codes and reason texts are what clients
//! match on, so they must stay exactly as listed.

use std::fmt;

/// Close codes used by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000 normal closure.
    Normal,
    /// 1001 server going away.
    GoingAway,
    /// 4400 malformed or unexpected message.
    BadRequest,
    /// 4401 operation before the connection was acknowledged.
    Unauthorized,
    /// 4403 connection refused by the engine.
    Forbidden,
    /// 4408 no `connection_init` within the wait timeout.
    InitTimeout,
    /// 4409 operation ID already live.
    SubscriberExists,
    /// 4429 repeated `connection_init`.
    TooManyInitRequests,
    /// 4504 no inbound traffic within the keep-alive timeout.
    KeepAliveTimeout,
}

impl CloseCode {
    /// Numeric code sent in the close frame.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::BadRequest => 4400,
            Self::Unauthorized => 4401,
            Self::Forbidden => 4403,
            Self::InitTimeout => 4408,
            Self::SubscriberExists => 4409,
            Self::TooManyInitRequests => 4429,
            Self::KeepAliveTimeout => 4504,
        }
    }

    /// Whether this code reports a protocol violation by the client.
    pub fn is_violation(self) -> bool {
        !matches!(self, Self::Normal | Self::GoingAway | Self::KeepAliveTimeout)
    }
}

/// Longest close reason a close frame can carry: 125 control-frame payload
/// bytes minus the two-byte code.
pub const MAX_REASON_BYTES: usize = 123;

/// A close frame: code plus reason text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close code.
    pub code: CloseCode,
    /// Reason text.
    pub reason: String,
}

impl CloseFrame {
    /// Build a frame from a code and reason.
    ///
    /// Reasons often quote client input, so they are cut to
    /// [`MAX_REASON_BYTES`] on a char boundary.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.len() > MAX_REASON_BYTES {
            let mut end = MAX_REASON_BYTES;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }
        Self { code, reason }
    }

    /// 1000 `Ok`.
    pub fn normal() -> Self {
        Self::new(CloseCode::Normal, "Ok")
    }

    /// 1001 `Server shutting down`.
    pub fn going_away() -> Self {
        Self::new(CloseCode::GoingAway, "Server shutting down")
    }

    /// 4400 with a context-specific message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(CloseCode::BadRequest, message)
    }

    /// 4400 `id required`.
    pub fn id_required() -> Self {
        Self::bad_request("id required")
    }

    /// 4400 `Unexpected packet type: <label>`.
    pub fn unexpected_type(label: &str) -> Self {
        Self::bad_request(format!("Unexpected packet type: {label}"))
    }

    /// 4401 `Unauthorized`.
    pub fn unauthorized() -> Self {
        Self::new(CloseCode::Unauthorized, "Unauthorized")
    }

    /// 4403 `Forbidden`.
    pub fn forbidden() -> Self {
        Self::new(CloseCode::Forbidden, "Forbidden")
    }

    /// 4408 `Connection initialisation timeout`.
    pub fn init_timeout() -> Self {
        Self::new(CloseCode::InitTimeout, "Connection initialisation timeout")
    }

    /// 4409 `Subscriber for <id> already exists`.
    pub fn subscriber_exists(id: &str) -> Self {
        Self::new(
            CloseCode::SubscriberExists,
            format!("Subscriber for {id} already exists"),
        )
    }

    /// 4429 `Too many initialisation requests`.
    pub fn too_many_init_requests() -> Self {
        Self::new(CloseCode::TooManyInitRequests, "Too many initialisation requests")
    }

    /// 4504 `Keep-alive timeout`.
    pub fn keep_alive_timeout() -> Self {
        Self::new(CloseCode::KeepAliveTimeout, "Keep-alive timeout")
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code.as_u16(), self.reason)
    }
}
