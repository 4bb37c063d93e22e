//! Error types for the session layer.
//!
//! A registry miss is not in here on purpose: looking up an unknown or
//! expired session is a normal outcome and comes back as `None`.

/// Why a notification could not be pushed over a [`ClientLink`](crate::ClientLink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The link was closed by a failure path. Nothing more may be sent.
    #[error("link already closed")]
    Closed,

    /// The writer on the other end is gone (client disconnected).
    #[error("link receiver dropped")]
    Gone,
}

/// Why a registration token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token was presented on a session it was not issued for.
    #[error("session does not own this token")]
    InvalidSession,

    /// Empty, unknown, or superseded token.
    #[error("invalid registration token")]
    InvalidToken,

    /// The token's lifetime has elapsed (or none was ever issued).
    #[error("registration token expired")]
    Expired,
}

impl TokenError {
    /// Stable machine-readable code sent to clients.
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidSession => "INVALID_SESSION",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Expired => "TOKEN_EXPIRED",
        }
    }
}
