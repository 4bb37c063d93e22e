//! The per-user connection slot.
//!
//! A [`ClientLink`] is the only way the core talks to a client. It wraps
//! the sending half of an unbounded channel; the gateway's writer task owns
//! the receiving half and the actual socket. Dropping or closing a link
//! never tears down the socket directly: closing enqueues a final
//! [`Outbound::Close`] and the writer acts on it.
//!
//! Closing is close-once. Clones share one `closed` flag, so when two
//! failure paths race on the same connection exactly one `close()` call
//! returns `true` and exactly one `Close` frame is queued.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use gauntlet_protocol::Notification;
use tokio::sync::mpsc;

use crate::LinkError;

/// Counter for generating unique link IDs.
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a link, stable across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// What the writer task should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialize and send this notification.
    Notify(Notification),
    /// Flush, send a close frame, and stop.
    Close,
}

/// Receiving half handed to whoever owns the socket.
pub type LinkReceiver = mpsc::UnboundedReceiver<Outbound>;

/// A cloneable, close-once handle for pushing notifications to one client.
#[derive(Debug, Clone)]
pub struct ClientLink {
    id: LinkId,
    tx: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl ClientLink {
    /// Creates a link and the receiver its writer task should drain.
    pub fn channel() -> (Self, LinkReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Self {
            id: LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed)),
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (link, rx)
    }

    /// Returns this link's identifier.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Queues a notification. Never blocks.
    ///
    /// # Errors
    /// [`LinkError::Closed`] after [`close`](Self::close);
    /// [`LinkError::Gone`] once the writer has dropped its receiver.
    pub fn send(&self, notification: Notification) -> Result<(), LinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LinkError::Closed);
        }
        self.tx
            .send(Outbound::Notify(notification))
            .map_err(|_| LinkError::Gone)
    }

    /// Closes the link. Returns `true` only for the call that actually
    /// closed it; every later call (on any clone) is a no-op.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // The writer may already be gone; closing is still committed.
        let _ = self.tx.send(Outbound::Close);
        true
    }

    /// Whether [`close`](Self::close) has been called on any clone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
