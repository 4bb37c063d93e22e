//! Deadlines for Gauntlet.
//!
//! Two background mechanisms force a user back to the waiting room when
//! time runs out:
//!
//! - [`TimeoutSupervisor`]: a one-shot, cancellable deadline per user per
//!   challenge. Cancel and fire race on a single [`latch`](Latch); exactly
//!   one of them wins. [`ChallengeDeadlines`] keeps one per user and
//!   forgets each as soon as it fires.
//! - [`TokenMonitor`]: polls a user's registration token and fails the
//!   user once it has expired.
//!
//! Both run as tokio tasks, not threads, and both route the actual failure
//! through [`gauntlet_flow::Recovery`].

mod config;
mod deadlines;
mod latch;
mod monitor;
mod supervisor;

pub use config::TimerConfig;
pub use deadlines::ChallengeDeadlines;
pub use latch::{Latch, LatchState};
pub use monitor::TokenMonitor;
pub use supervisor::{ExpiryAction, StageTimeout, TimeoutSupervisor};
