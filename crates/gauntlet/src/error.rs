//! Unified error type for the Gauntlet facade.

use gauntlet_flow::FlowError;
use gauntlet_placement::LayoutError;
use gauntlet_protocol::ProtocolError;
use gauntlet_session::{LinkError, TokenError};
use tokio_tungstenite::tungstenite;

/// Top-level error wrapping every layer's error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum GauntletError {
    /// Encode/decode failure or an unexpected frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A flow request that does not fit the user's current stage.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// The client's connection is already closed.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The captcha scene could not be generated.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<TokenError> for GauntletError {
    fn from(err: TokenError) -> Self {
        Self::Flow(FlowError::Token(err))
    }
}

impl GauntletError {
    /// Stable code sent to the client in an `error` notification.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "BAD_MESSAGE",
            Self::Flow(e) => e.code(),
            Self::Layout(_) => "SERVER_ERROR",
            Self::Link(_) | Self::WebSocket(_) | Self::Io(_) => "CONNECTION",
        }
    }
}
