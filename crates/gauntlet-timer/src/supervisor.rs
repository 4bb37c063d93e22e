//! Per-user, per-challenge deadlines.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gauntlet_flow::{FailureKind, Recovery};
use gauntlet_protocol::Stage;
use gauntlet_session::UserHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{Latch, LatchState};

/// What happens when a deadline fires.
///
/// Called at most once per [`TimeoutSupervisor::start`], from the timer
/// task, and never after a successful [`TimeoutSupervisor::cancel`].
pub trait ExpiryAction: Send + Sync + 'static {
    fn on_expire(&self, user: &UserHandle);
}

impl<F> ExpiryAction for F
where
    F: Fn(&UserHandle) + Send + Sync + 'static,
{
    fn on_expire(&self, user: &UserHandle) {
        self(user)
    }
}

/// Fails the user with [`FailureKind::Timeout`] if they are still in the
/// stage the deadline was armed for.
#[derive(Debug, Clone)]
pub struct StageTimeout {
    recovery: Recovery,
    stage: Stage,
}

impl StageTimeout {
    pub fn new(recovery: Recovery, stage: Stage) -> Self {
        Self { recovery, stage }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }
}

impl ExpiryAction for StageTimeout {
    fn on_expire(&self, user: &UserHandle) {
        if !self.recovery.fail_in(user, self.stage, FailureKind::Timeout) {
            debug!(
                user_id = %user.id(),
                stage = %self.stage,
                "deadline fired after user left the stage"
            );
        }
    }
}

#[derive(Debug)]
struct Armed {
    latch: Arc<Latch>,
    cancel: CancellationToken,
}

/// A one-shot deadline bound to one user at a time.
///
/// [`start`](Self::start) spawns a timer task; [`cancel`](Self::cancel)
/// may be called from any task. Cancel and fire settle a shared [`Latch`]
/// so exactly one of them takes effect. Restarting an armed supervisor
/// cancels the previous deadline first.
///
/// Dropping the supervisor cancels any pending deadline.
pub struct TimeoutSupervisor<A: ExpiryAction> {
    action: Arc<A>,
    default_duration: Duration,
    armed: Mutex<Option<Armed>>,
}

impl<A: ExpiryAction> TimeoutSupervisor<A> {
    pub fn new(action: A, default_duration: Duration) -> Self {
        Self {
            action: Arc::new(action),
            default_duration,
            armed: Mutex::new(None),
        }
    }

    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Arms the deadline for `user` with the configured duration.
    pub fn arm(&self, user: UserHandle) {
        self.start(user, self.default_duration);
    }

    /// Arms a deadline that fires after `duration` unless cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, user: UserHandle, duration: Duration) {
        let latch = Arc::new(Latch::new());
        let cancel = CancellationToken::new();

        let previous = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Armed {
                latch: Arc::clone(&latch),
                cancel: cancel.clone(),
            });
        if let Some(previous) = previous {
            previous.latch.try_cancel();
            previous.cancel.cancel();
        }

        let action = Arc::clone(&self.action);
        let user_id = user.id();
        debug!(%user_id, duration_ms = duration.as_millis() as u64, "deadline armed");
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(%user_id, "deadline task stopped");
                }
                () = tokio::time::sleep(duration) => {
                    if latch.try_fire() {
                        info!(%user_id, "deadline fired");
                        action.on_expire(&user);
                    }
                }
            }
        });
    }

    /// Disarms the deadline.
    ///
    /// Returns `true` if this call stopped a deadline that had not fired,
    /// which guarantees the expiry action will not run. Returns `false`
    /// if nothing was armed or the deadline already fired.
    pub fn cancel(&self) -> bool {
        let armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(armed) = armed else {
            return false;
        };
        let won = armed.latch.try_cancel();
        armed.cancel.cancel();
        won
    }

    /// Whether a deadline is armed and has neither fired nor been
    /// cancelled.
    pub fn is_running(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|a| a.latch.state() == LatchState::Armed)
    }
}

impl<A: ExpiryAction> Drop for TimeoutSupervisor<A> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<A: ExpiryAction> std::fmt::Debug for TimeoutSupervisor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutSupervisor")
            .field("default_duration", &self.default_duration)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gauntlet_protocol::{SessionId, UserId};
    use gauntlet_session::User;

    use super::*;

    fn user() -> UserHandle {
        UserHandle::new(User::new(UserId(1), SessionId::new("s")))
    }

    fn counting() -> (Arc<AtomicUsize>, impl ExpiryAction) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        (count, move |_: &UserHandle| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_duration() {
        let (count, action) = counting();
        let supervisor = TimeoutSupervisor::new(action, Duration::from_secs(1));

        supervisor.start(user(), Duration::from_millis(50));
        assert!(supervisor.is_running());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!supervisor.is_running());
        assert!(!supervisor.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_deadline_prevents_fire() {
        let (count, action) = counting();
        let supervisor = TimeoutSupervisor::new(action, Duration::from_secs(1));

        supervisor.start(user(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(supervisor.cancel());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_deadline() {
        let (count, action) = counting();
        let supervisor = TimeoutSupervisor::new(action, Duration::from_secs(1));

        supervisor.start(user(), Duration::from_millis(50));
        supervisor.start(user(), Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_uses_default_duration() {
        let (count, action) = counting();
        let supervisor = TimeoutSupervisor::new(action, Duration::from_millis(100));

        supervisor.arm(user());
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let (_count, action) = counting();
        let supervisor = TimeoutSupervisor::new(action, Duration::from_secs(1));
        assert!(!supervisor.cancel());
        assert!(!supervisor.is_running());
    }
}
