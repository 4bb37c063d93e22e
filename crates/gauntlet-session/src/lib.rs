//! Participant state for Gauntlet.
//!
//! This crate owns everything that describes one participant:
//!
//! 1. **The user record** ([`User`]): status, stage-scoped challenge
//!    fields, registration token, and the current connection slot.
//! 2. **Shared access** ([`UserHandle`]): the record behind a lock, cloned
//!    into the queue, the timers, and the request handlers.
//! 3. **The connection slot** ([`ClientLink`]): a non-owning, close-once
//!    handle used only to push notifications and to close on failure.
//! 4. **The registry** ([`SessionRegistry`]): session id → user, with an
//!    optional TTL.
//!
//! # How it fits in the stack
//!
//! ```text
//! Flow / Timer (above)  ← mutate users, push notifications, close links
//!     ↕
//! Session (this crate)  ← identity, records, connection slots
//!     ↕
//! Protocol (below)      ← UserId, SessionId, Stage, Notification
//! ```

mod error;
mod link;
mod registry;
mod token;
mod user;

pub use error::{LinkError, TokenError};
pub use link::{ClientLink, LinkId, LinkReceiver, Outbound};
pub use registry::{SessionConfig, SessionRegistry};
pub use token::RegistrationToken;
pub use user::{Attempt, CaptchaState, MAX_ATTEMPTS, OtpState, User, UserHandle};
