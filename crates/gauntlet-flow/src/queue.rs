//! FIFO admission queue.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use gauntlet_protocol::{Notification, UserId};
use gauntlet_session::ClientLink;

/// One waiting user and the connection to push position updates to.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user_id: UserId,
    /// `None` for users re-queued after a failure until they reconnect.
    pub link: Option<ClientLink>,
}

/// Users waiting for their turn, oldest first.
///
/// Positions are 1-based and always contiguous from 1 to `len()`. A user
/// id appears at most once. Readers share the lock; mutations and
/// [`broadcast_positions`](Self::broadcast_positions) take it exclusively.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    entries: RwLock<VecDeque<QueueEntry>>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user at the tail.
    ///
    /// Returns `false` and changes nothing if the user is already queued.
    pub fn add(&self, user_id: UserId, link: Option<ClientLink>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|e| e.user_id == user_id) {
            return false;
        }
        entries.push_back(QueueEntry { user_id, link });
        tracing::debug!(%user_id, len = entries.len(), "queued");
        true
    }

    /// Queues the user with `link`, or swaps `link` into the existing
    /// entry without moving it. Returns `true` if the user was already
    /// queued.
    pub fn add_or_attach(&self, user_id: UserId, link: ClientLink) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.iter_mut().find(|e| e.user_id == user_id) {
            entry.link = Some(link);
            return true;
        }
        entries.push_back(QueueEntry { user_id, link: Some(link) });
        tracing::debug!(%user_id, len = entries.len(), "queued");
        false
    }

    /// Removes the user, closing the gap. No-op if absent.
    pub fn remove(&self, user_id: UserId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = entries.iter().position(|e| e.user_id == user_id) else {
            return false;
        };
        entries.remove(index);
        tracing::debug!(%user_id, len = entries.len(), "dequeued");
        true
    }

    /// 1-based position, or `None` if the user is not queued.
    pub fn position(&self, user_id: UserId) -> Option<usize> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().position(|e| e.user_id == user_id).map(|i| i + 1)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.position(user_id).is_some()
    }

    /// Removes and returns the head.
    pub fn pop_front(&self) -> Option<QueueEntry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends every connected entry its current position and the total.
    ///
    /// Holds the lock exclusively so nobody sees a half-updated view.
    /// Delivery failures are logged and skipped; the entry stays queued.
    /// Returns how many updates were delivered.
    pub fn broadcast_positions(&self) -> usize {
        let entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let total = entries.len();
        let mut delivered = 0;
        for (index, entry) in entries.iter().enumerate() {
            let Some(link) = &entry.link else {
                continue;
            };
            let update = Notification::QueueUpdate { position: index + 1, total };
            match link.send(update) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        user_id = %entry.user_id,
                        error = %e,
                        "queue update not delivered"
                    );
                }
            }
        }
        delivered
    }
}
