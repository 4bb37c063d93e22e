//! Stage progression for Gauntlet.
//!
//! # Key types
//!
//! - [`StageMachine`]: validates and executes stage transitions
//! - [`AdmissionQueue`]: FIFO waiting line with position broadcast
//! - [`Recovery`]: the one failure path: notify, reset, close, re-queue
//! - [`FailureKind`]: why a user is being sent back
//! - [`kana_match`] and [`pick_fish`]: the fish-name check

mod challenge;
mod error;
mod machine;
mod otp;
mod queue;
mod recovery;
mod transition;

pub use challenge::{DEFAULT_CLICK_TOLERANCE, click_hits};
pub use error::FlowError;
pub use machine::StageMachine;
pub use otp::{FISH, Fish, kana_match, pick_fish};
pub use queue::{AdmissionQueue, QueueEntry};
pub use recovery::{FailureKind, REDIRECT_DELAY_SECS, Recovery};
pub use transition::{can_transition, instruction, successors};
