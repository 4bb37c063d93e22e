//! One-shot fire/cancel arbitration.

use std::sync::atomic::{AtomicU8, Ordering};

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELED: u8 = 2;

/// Observable state of a [`Latch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Armed,
    Fired,
    Canceled,
}

/// Decides the race between a deadline firing and someone cancelling it.
///
/// Both sides attempt a compare-and-swap out of `Armed`; whichever lands
/// first wins and the other becomes a no-op. Once settled the latch never
/// changes again.
#[derive(Debug)]
pub struct Latch(AtomicU8);

impl Latch {
    pub fn new() -> Self {
        Self(AtomicU8::new(ARMED))
    }

    /// Claims the latch for the firing side. `true` means the caller must
    /// run the expiry side effects.
    pub fn try_fire(&self) -> bool {
        self.settle(FIRED)
    }

    /// Claims the latch for the cancelling side. `true` guarantees the
    /// expiry side effects will never run.
    pub fn try_cancel(&self) -> bool {
        self.settle(CANCELED)
    }

    pub fn state(&self) -> LatchState {
        match self.0.load(Ordering::Acquire) {
            ARMED => LatchState::Armed,
            FIRED => LatchState::Fired,
            _ => LatchState::Canceled,
        }
    }

    fn settle(&self, to: u8) -> bool {
        self.0
            .compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}
