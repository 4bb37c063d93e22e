//! The single failure path.
//!
//! Timeouts, game overs, exhausted attempts, server errors and token
//! expiry all end here. Inside one critical section on the user record it
//! takes the connection out of the record, sends the failure notice,
//! resets the user and closes the connection. Only then, with the user
//! lock released, is the user put back at the tail of the queue.

use std::sync::Arc;

use gauntlet_protocol::{Notification, Stage};
use gauntlet_session::{User, UserHandle};

use crate::AdmissionQueue;

/// Seconds the client waits before returning to the waiting room.
pub const REDIRECT_DELAY_SECS: u64 = 3;

/// Why a user is being sent back to the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Timeout,
    GameOver,
    AttemptsExhausted,
    WrongFishName,
    ServerError,
    TokenExpired,
}

impl FailureKind {
    /// Fixed user-facing text for this failure.
    pub fn message(self) -> &'static str {
        match self {
            Self::Timeout => "Time is up. Returning to the waiting room.",
            Self::GameOver => "Game over. Returning to the waiting room.",
            Self::AttemptsExhausted => "Too many wrong answers. Returning to the waiting room.",
            Self::WrongFishName => "Three wrong fish names. Returning to the waiting room.",
            Self::ServerError => "Server error. Returning to the waiting room.",
            Self::TokenExpired => "Your registration token expired. Returning to the waiting room.",
        }
    }

    fn notification(self, redirect_delay: u64) -> Notification {
        let message = self.message().to_string();
        match self {
            Self::TokenExpired => Notification::TokenExpired { message },
            _ => Notification::Failure { message, redirect_delay },
        }
    }
}

/// Applies forced resets.
#[derive(Debug, Clone)]
pub struct Recovery {
    queue: Arc<AdmissionQueue>,
    redirect_delay_secs: u64,
}

impl Recovery {
    pub fn new(queue: Arc<AdmissionQueue>) -> Self {
        Self {
            queue,
            redirect_delay_secs: REDIRECT_DELAY_SECS,
        }
    }

    pub fn with_redirect_delay(mut self, secs: u64) -> Self {
        self.redirect_delay_secs = secs;
        self
    }

    pub fn queue(&self) -> &Arc<AdmissionQueue> {
        &self.queue
    }

    /// Sends `user` back to the waiting room.
    ///
    /// Returns `true` if this call closed a connection. A user with no
    /// connection is still reset and re-queued, just not notified.
    pub fn fail(&self, user: &UserHandle, kind: FailureKind) -> bool {
        self.fail_if(user, kind, |_| true).unwrap_or(false)
    }

    /// Like [`fail`](Self::fail), but only while the user is still in
    /// `stage`. A stale timer for a stage the user has already left does
    /// nothing. Returns whether the failure was applied.
    pub fn fail_in(&self, user: &UserHandle, stage: Stage, kind: FailureKind) -> bool {
        self.fail_if(user, kind, |u| u.status == stage).is_some()
    }

    /// Fails the user only if `applies` holds, checked under the same lock
    /// that commits the reset.
    ///
    /// Returns `None` when the predicate refused, otherwise whether a
    /// connection was closed.
    pub fn fail_if(
        &self,
        user: &UserHandle,
        kind: FailureKind,
        applies: impl FnOnce(&User) -> bool,
    ) -> Option<bool> {
        let closed = {
            let mut guard = user.lock();
            if !applies(&*guard) {
                return None;
            }
            let from = guard.status;
            let link = guard.take_link();
            if let Some(link) = &link {
                if let Err(e) = link.send(kind.notification(self.redirect_delay_secs)) {
                    tracing::debug!(
                        user_id = %user.id(),
                        error = %e,
                        "failure notice not delivered"
                    );
                }
            }
            guard.reset_to_waiting();
            let closed = link.is_some_and(|l| l.close());
            tracing::info!(user_id = %user.id(), %from, reason = ?kind, closed, "user sent back");
            closed
        };

        if self.queue.add(user.id(), None) {
            self.queue.broadcast_positions();
        }
        Some(closed)
    }
}
