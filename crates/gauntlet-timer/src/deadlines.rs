//! The table of running challenge deadlines, one per user.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use gauntlet_flow::Recovery;
use gauntlet_protocol::{Stage, UserId};
use gauntlet_session::UserHandle;
use tracing::debug;

use crate::{ExpiryAction, StageTimeout, TimeoutSupervisor, TimerConfig};

type Slots = Mutex<HashMap<UserId, Slot>>;

struct Slot {
    generation: u64,
    supervisor: TimeoutSupervisor<Retiring>,
}

/// Applies the stage timeout, then drops its own slot from the table.
struct Retiring {
    timeout: StageTimeout,
    slots: Weak<Slots>,
    generation: u64,
}

impl ExpiryAction for Retiring {
    fn on_expire(&self, user: &UserHandle) {
        self.timeout.on_expire(user);
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        let retired = {
            let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.get(&user.id()).is_some_and(|s| s.generation == self.generation) {
                slots.remove(&user.id())
            } else {
                None
            }
        };
        // Dropped outside the table lock.
        drop(retired);
    }
}

/// Challenge deadlines keyed by user.
///
/// Each user has at most one running deadline: arming a new stage replaces
/// (and cancels) the previous one. A deadline that fires removes itself,
/// so the table only holds deadlines that can still fire.
pub struct ChallengeDeadlines {
    recovery: Recovery,
    config: TimerConfig,
    slots: Arc<Slots>,
    next_generation: AtomicU64,
}

impl ChallengeDeadlines {
    pub fn new(recovery: Recovery, config: &TimerConfig) -> Self {
        Self {
            recovery,
            config: config.clone(),
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Arms the deadline for `stage`. Returns `false`, arming nothing, for
    /// a stage without a time limit.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, user: &UserHandle, stage: Stage) -> bool {
        let Some(duration) = self.config.stage_timeout(stage) else {
            return false;
        };
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let supervisor = TimeoutSupervisor::new(
            Retiring {
                timeout: StageTimeout::new(self.recovery.clone(), stage),
                slots: Arc::downgrade(&self.slots),
                generation,
            },
            duration,
        );
        let replaced = {
            let mut slots = self.lock_slots();
            let replaced = slots.remove(&user.id());
            let slot = slots.entry(user.id()).or_insert(Slot { generation, supervisor });
            slot.supervisor.arm(user.clone());
            replaced
        };
        if replaced.is_some() {
            debug!(user_id = %user.id(), %stage, "previous deadline replaced");
        }
        true
    }

    /// Cancels `user_id`'s deadline.
    ///
    /// Returns `true` if it had not fired yet, which guarantees it never
    /// will.
    pub fn disarm(&self, user_id: UserId) -> bool {
        let slot = self.lock_slots().remove(&user_id);
        slot.is_some_and(|s| s.supervisor.cancel())
    }

    pub fn is_armed(&self, user_id: UserId) -> bool {
        self.lock_slots()
            .get(&user_id)
            .is_some_and(|s| s.supervisor.is_running())
    }

    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every deadline. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<Slot> = self.lock_slots().drain().map(|(_, slot)| slot).collect();
        drained.len()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<UserId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ChallengeDeadlines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeDeadlines")
            .field("armed", &self.len())
            .finish()
    }
}
