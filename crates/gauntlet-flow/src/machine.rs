//! Applying stage transitions to a user record.

use gauntlet_protocol::{Notification, Stage};
use gauntlet_session::User;

use crate::{FlowError, can_transition, instruction};

/// Validates and applies stage transitions.
///
/// Operates on a `&mut User`, so callers hold the user's lock for the
/// whole check-then-set.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageMachine;

impl StageMachine {
    pub fn new() -> Self {
        Self
    }

    /// Whether `user` may move to `target` from where it is now.
    pub fn can_transition(&self, user: &User, target: Stage) -> bool {
        can_transition(user.status, target)
    }

    /// Moves `user` to `target` and tells the client.
    ///
    /// The notification is best-effort: a dead connection does not undo
    /// the transition.
    ///
    /// # Errors
    /// [`FlowError::InvalidTransition`] when the table has no such edge.
    /// The user is left unchanged.
    pub fn execute(&self, user: &mut User, target: Stage) -> Result<(), FlowError> {
        let from = user.status;
        if !can_transition(from, target) {
            tracing::warn!(user_id = %user.id(), %from, to = %target, "rejected stage transition");
            return Err(FlowError::InvalidTransition { from, to: target });
        }
        user.status = target;
        tracing::info!(user_id = %user.id(), %from, to = %target, "stage changed");
        user.notify(Notification::StageChange {
            stage: target,
            message: instruction(target).to_string(),
        });
        Ok(())
    }

    /// Sends `user` back to [`Stage::Waiting`], clearing stage data.
    /// Always succeeds and does not notify.
    pub fn reset(&self, user: &mut User) {
        user.reset_to_waiting();
    }
}
