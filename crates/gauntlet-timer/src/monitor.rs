//! Background watch loops for registration tokens.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gauntlet_flow::{FailureKind, Recovery};
use gauntlet_protocol::UserId;
use gauntlet_session::UserHandle;
use rand::Rng;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{Latch, TimerConfig};

#[derive(Debug)]
struct Watcher {
    generation: u64,
    latch: Arc<Latch>,
    cancel: CancellationToken,
}

type Watchers = Arc<Mutex<HashMap<UserId, Watcher>>>;

enum Poll {
    Pending,
    Fired,
    Gone,
}

/// Watches issued registration tokens and fails users whose token ran out.
///
/// One tokio task per watched user. Each task polls at a fixed interval;
/// on the first poll that sees the token expired it fails the user with
/// [`FailureKind::TokenExpired`] and stops. If the token disappears
/// (because some other path already reset the user) the loop stops
/// without doing anything.
///
/// All loops hang off a root [`CancellationToken`]; [`stop`](Self::stop)
/// ends every one of them.
#[derive(Debug)]
pub struct TokenMonitor {
    recovery: Recovery,
    poll_interval: Duration,
    initial_jitter: Duration,
    root: CancellationToken,
    watchers: Watchers,
    next_generation: AtomicU64,
}

impl TokenMonitor {
    pub fn new(recovery: Recovery, config: &TimerConfig) -> Self {
        Self {
            recovery,
            poll_interval: config.token_poll_interval,
            initial_jitter: config.initial_poll_jitter,
            root: CancellationToken::new(),
            watchers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Starts watching `user`'s token. Replaces an existing watch on the
    /// same user. Ignored after [`stop`](Self::stop).
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self, user: UserHandle) {
        if self.root.is_cancelled() {
            debug!(user_id = %user.id(), "monitor stopped, watch ignored");
            return;
        }
        let user_id = user.id();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let latch = Arc::new(Latch::new());
        let cancel = self.root.child_token();

        let previous = self.lock_watchers().insert(
            user_id,
            Watcher {
                generation,
                latch: Arc::clone(&latch),
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.latch.try_cancel();
            previous.cancel.cancel();
        }

        let first_poll = self.poll_interval + self.jitter();
        let interval = self.poll_interval;
        let recovery = self.recovery.clone();
        let watchers = Arc::clone(&self.watchers);
        debug!(%user_id, generation, "token watch started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + first_poll, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!(%user_id, "token watch cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        match poll(&recovery, &user, &latch) {
                            Poll::Pending => {}
                            Poll::Fired => {
                                info!(%user_id, "registration token expired");
                                break;
                            }
                            Poll::Gone => {
                                debug!(%user_id, "token gone, watch ends");
                                break;
                            }
                        }
                    }
                }
            }
            let mut watchers = watchers.lock().unwrap_or_else(PoisonError::into_inner);
            if watchers.get(&user_id).is_some_and(|w| w.generation == generation) {
                watchers.remove(&user_id);
            }
        });
    }

    /// Stops watching `user_id`.
    ///
    /// Returns `true` if this call stopped a loop before it fired, which
    /// guarantees no expiry will be applied by that loop.
    pub fn unwatch(&self, user_id: UserId) -> bool {
        let Some(watcher) = self.lock_watchers().remove(&user_id) else {
            return false;
        };
        let won = watcher.latch.try_cancel();
        watcher.cancel.cancel();
        won
    }

    /// Ends every watch loop. Later [`watch`](Self::watch) calls are
    /// ignored.
    pub fn stop(&self) {
        self.root.cancel();
        let mut watchers = self.lock_watchers();
        for watcher in watchers.values() {
            watcher.latch.try_cancel();
        }
        let count = watchers.len();
        watchers.clear();
        info!(count, "token monitor stopped");
    }

    pub fn is_watching(&self, user_id: UserId) -> bool {
        self.lock_watchers().contains_key(&user_id)
    }

    pub fn watching_count(&self) -> usize {
        self.lock_watchers().len()
    }

    fn jitter(&self) -> Duration {
        let max = self.initial_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max))
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, Watcher>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn poll(recovery: &Recovery, user: &UserHandle, latch: &Latch) -> Poll {
    let now = Instant::now();
    {
        let guard = user.lock();
        if guard.token.is_none() {
            return Poll::Gone;
        }
        if !guard.token_expired_at(now) {
            return Poll::Pending;
        }
    }
    if !latch.try_fire() {
        return Poll::Gone;
    }
    // Re-checked under the lock that commits the reset.
    let applied = recovery.fail_if(user, FailureKind::TokenExpired, |u| {
        u.token.is_some() && u.token_expired_at(now)
    });
    if applied.is_some() { Poll::Fired } else { Poll::Gone }
}

#[cfg(test)]
mod tests {
    use gauntlet_flow::AdmissionQueue;
    use gauntlet_protocol::{Notification, SessionId, Stage};
    use gauntlet_session::{ClientLink, LinkReceiver, Outbound, User};

    use super::*;

    fn config() -> TimerConfig {
        TimerConfig {
            token_poll_interval: Duration::from_millis(100),
            initial_poll_jitter: Duration::ZERO,
            ..Default::default()
        }
    }

    fn registering_user(ttl: Duration) -> (UserHandle, LinkReceiver) {
        let mut user = User::new(UserId(5), SessionId::new("s"));
        user.status = Stage::Registering;
        user.issue_token(ttl);
        let (link, rx) = ClientLink::channel();
        user.attach_link(link);
        (UserHandle::new(user), rx)
    }

    fn monitor() -> (TokenMonitor, Arc<AdmissionQueue>) {
        let queue = Arc::new(AdmissionQueue::new());
        (TokenMonitor::new(Recovery::new(Arc::clone(&queue)), &config()), queue)
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_fails_user_once() {
        let (monitor, queue) = monitor();
        let (user, mut rx) = registering_user(Duration::from_millis(250));

        monitor.watch(user.clone());
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            Outbound::Notify(Notification::TokenExpired { .. })
        ));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert!(rx.try_recv().is_err());
        assert_eq!(user.lock().status, Stage::Waiting);
        assert!(user.lock().token.is_none());
        assert_eq!(queue.len(), 1);
        assert!(!monitor.is_watching(UserId(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwatch_before_expiry_prevents_failure() {
        let (monitor, queue) = monitor();
        let (user, mut rx) = registering_user(Duration::from_millis(250));

        monitor.watch(user.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.unwatch(UserId(5)));
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(user.lock().status, Stage::Registering);
        assert!(queue.is_empty());
        assert!(!monitor.unwatch(UserId(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_ends_silently_when_token_cleared() {
        let (monitor, queue) = monitor();
        let (user, mut rx) = registering_user(Duration::from_millis(250));

        monitor.watch(user.clone());
        user.lock().reset_to_waiting();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(rx.try_recv().is_err());
        assert!(queue.is_empty());
        assert_eq!(monitor.watching_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_all_loops_and_rejects_new_watches() {
        let (monitor, queue) = monitor();
        let (user, _rx) = registering_user(Duration::from_millis(250));

        monitor.watch(user.clone());
        monitor.stop();
        assert_eq!(monitor.watching_count(), 0);
        monitor.watch(user.clone());
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(user.lock().status, Stage::Registering);
        assert!(queue.is_empty());
        assert!(!monitor.is_watching(UserId(5)));
    }
}
