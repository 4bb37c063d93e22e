//! Wire protocol for Gauntlet.
//!
//! This crate defines what the server and a waiting client say to each
//! other:
//!
//! - **Identity** ([`UserId`], [`SessionId`]): who a participant is.
//! - **Stages** ([`Stage`]): where in the registration flow they are.
//! - **Messages** ([`Notification`] server → client, [`ClientMessage`]
//!   client → server).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about connections, queues, or timers.
//! Every other crate in the workspace builds on these types.
//!
//! ```text
//! Gateway (bytes) → Protocol (messages) → Session / Flow / Timer
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientMessage, Notification, SessionId, Sprite, Stage, UserId,
};
