//! The user record and its shared handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gauntlet_protocol::{Notification, SessionId, Stage, UserId};
use tokio::time::Instant;

use crate::token::generate_secret;
use crate::{ClientLink, RegistrationToken, TokenError};

/// Upper bound for every per-stage attempt counter.
pub const MAX_ATTEMPTS: u32 = 3;

/// Result of recording a wrong answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The user may try again this many more times.
    Retry { remaining: u32 },
    /// The counter reached [`MAX_ATTEMPTS`]; the caller must force a reset.
    Exhausted,
}

/// Captcha-stage fields. Zeroed on reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptchaState {
    /// Centre of the hidden target, in image pixels.
    pub target_x: i32,
    pub target_y: i32,
    pub attempts: u32,
}

/// Fish-name check fields. Zeroed on reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtpState {
    /// The answer the user is expected to type.
    pub fish_name: String,
    pub attempts: u32,
}

/// One participant.
///
/// Stage-scoped fields (`captcha`, `otp`, `token`) only mean something
/// while `status` is in the matching stage; [`reset_to_waiting`] zeroes
/// all of them at once.
///
/// [`reset_to_waiting`]: User::reset_to_waiting
#[derive(Debug)]
pub struct User {
    id: UserId,
    session_id: SessionId,
    joined_at: Instant,

    /// Current stage. Prefer `StageMachine::execute` over writing this
    /// directly so the client hears about the change.
    pub status: Stage,

    pub captcha: CaptchaState,
    pub otp: OtpState,
    pub token: Option<RegistrationToken>,

    /// Current connection, if any. Never owned: see [`ClientLink`].
    link: Option<ClientLink>,
}

impl User {
    /// Creates a user in [`Stage::Waiting`] with no connection.
    pub fn new(id: UserId, session_id: SessionId) -> Self {
        Self {
            id,
            session_id,
            joined_at: Instant::now(),
            status: Stage::Waiting,
            captcha: CaptchaState::default(),
            otp: OtpState::default(),
            token: None,
            link: None,
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn joined_at(&self) -> Instant {
        self.joined_at
    }

    /// Sends the user back to the start of the flow.
    ///
    /// Clears every stage-scoped field, including the registration token.
    /// Idempotent. Does not touch the connection slot: failure paths take
    /// and close the link themselves while still holding the lock.
    pub fn reset_to_waiting(&mut self) {
        self.status = Stage::Waiting;
        self.captcha = CaptchaState::default();
        self.otp = OtpState::default();
        self.token = None;
    }

    // -- Challenge fields --------------------------------------------------

    /// Remembers where the captcha target is centred.
    pub fn set_captcha_target(&mut self, x: i32, y: i32) {
        self.captcha.target_x = x;
        self.captcha.target_y = y;
    }

    /// Counts a wrong captcha click.
    pub fn record_captcha_miss(&mut self) -> Attempt {
        bump(&mut self.captcha.attempts)
    }

    /// Counts a wrong fish name.
    pub fn record_otp_miss(&mut self) -> Attempt {
        bump(&mut self.otp.attempts)
    }

    // -- Registration token ------------------------------------------------

    /// Issues a fresh token valid for `ttl`, replacing any previous one.
    pub fn issue_token(&mut self, ttl: Duration) -> String {
        let value = generate_secret();
        self.token = Some(RegistrationToken {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        });
        value
    }

    /// Whether the token is unusable at `now`. No token counts as expired.
    pub fn token_expired_at(&self, now: Instant) -> bool {
        self.token.as_ref().is_none_or(|t| t.is_expired_at(now))
    }

    /// Checks a token presented on `session_id`.
    ///
    /// # Errors
    /// - [`TokenError::InvalidSession`]: wrong session
    /// - [`TokenError::InvalidToken`]: empty or mismatched
    /// - [`TokenError::Expired`]: lifetime elapsed, or never issued
    pub fn validate_token(
        &self,
        session_id: &SessionId,
        presented: &str,
    ) -> Result<(), TokenError> {
        if &self.session_id != session_id {
            return Err(TokenError::InvalidSession);
        }
        let Some(token) = &self.token else {
            return Err(TokenError::Expired);
        };
        if presented.is_empty() || token.value != presented {
            return Err(TokenError::InvalidToken);
        }
        if token.is_expired_at(Instant::now()) {
            return Err(TokenError::Expired);
        }
        Ok(())
    }

    // -- Connection slot ---------------------------------------------------

    /// Installs a new connection, returning the one it replaced.
    pub fn attach_link(&mut self, link: ClientLink) -> Option<ClientLink> {
        self.link.replace(link)
    }

    /// The current connection, if any.
    pub fn link(&self) -> Option<&ClientLink> {
        self.link.as_ref()
    }

    /// Removes the connection from the record. Whoever gets `Some` is the
    /// one path allowed to close it.
    pub fn take_link(&mut self) -> Option<ClientLink> {
        self.link.take()
    }

    /// Clears the slot only if it still holds `link` (the connection that
    /// is going away), so a newer connection is left alone.
    pub fn detach_link(&mut self, link: &ClientLink) -> bool {
        if self.link.as_ref().is_some_and(|l| l.id() == link.id()) {
            self.link = None;
            return true;
        }
        false
    }

    /// Pushes a notification over the current connection. Best-effort:
    /// returns `false` when there is no connection or the send failed.
    pub fn notify(&self, notification: Notification) -> bool {
        let Some(link) = &self.link else {
            return false;
        };
        match link.send(notification) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user_id = %self.id, error = %e, "notification dropped");
                false
            }
        }
    }
}

fn bump(counter: &mut u32) -> Attempt {
    *counter = (*counter + 1).min(MAX_ATTEMPTS);
    if *counter >= MAX_ATTEMPTS {
        Attempt::Exhausted
    } else {
        Attempt::Retry {
            remaining: MAX_ATTEMPTS - *counter,
        }
    }
}

// ---------------------------------------------------------------------------
// UserHandle
// ---------------------------------------------------------------------------

/// Shared, lockable access to one [`User`].
///
/// Cheap to clone. Every mutation (status changes, resets, taking the
/// link) happens under the same lock, which is what lets a failure path
/// reset the record and close the connection in one critical section.
/// Hold the guard only for synchronous work; never across an `.await`.
#[derive(Debug, Clone)]
pub struct UserHandle {
    id: UserId,
    inner: Arc<Mutex<User>>,
}

impl UserHandle {
    /// Wraps a record for sharing.
    pub fn new(user: User) -> Self {
        Self {
            id: user.id(),
            inner: Arc::new(Mutex::new(user)),
        }
    }

    /// The user's id, readable without taking the lock.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Locks the record. A poisoned lock is recovered: every mutation
    /// leaves the record in a valid state, so the data is still usable.
    pub fn lock(&self) -> MutexGuard<'_, User> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles point at the same record.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
