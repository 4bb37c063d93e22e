//! Error types for the flow layer.

use gauntlet_protocol::Stage;
use gauntlet_session::TokenError;

/// Errors returned to the caller of a flow operation.
///
/// Attempt exhaustion and expiry are deliberately absent: those are
/// handled inside the flow by [`Recovery`](crate::Recovery) and never
/// surface as an error value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// The transition table has no edge `from → to`.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    /// The request only makes sense in another stage.
    #[error("expected stage {expected}, user is in {actual}")]
    WrongStage { expected: Stage, actual: Stage },

    /// An answer arrived before its question was sent.
    #[error("no fish-name question has been sent")]
    OtpNotSent,

    /// A registration token was refused.
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl FlowError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::WrongStage { .. } => "WRONG_STAGE",
            Self::OtpNotSent => "OTP_NOT_SENT",
            Self::Token(e) => e.code(),
        }
    }
}
