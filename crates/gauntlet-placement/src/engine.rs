//! The rejection-sampling packer.

use rand::Rng;
use tracing::trace;

use crate::Rect;

/// Candidates sampled per [`PlacementEngine::try_place`] before giving up.
pub const DEFAULT_RETRIES: u32 = 100;

/// Places equally sized items in a container, one call at a time.
///
/// Generic over the random source so tests can inject a seeded one.
#[derive(Debug)]
pub struct PlacementEngine<R> {
    container_width: u32,
    container_height: u32,
    item_width: u32,
    item_height: u32,
    retries: u32,
    placed: Vec<Rect>,
    rng: R,
}

impl<R: Rng> PlacementEngine<R> {
    pub fn new(container: (u32, u32), item: (u32, u32), retries: u32, rng: R) -> Self {
        Self {
            container_width: container.0,
            container_height: container.1,
            item_width: item.0,
            item_height: item.1,
            retries,
            placed: Vec::new(),
            rng,
        }
    }

    /// Finds a free slot and records it.
    ///
    /// Samples top-left corners uniformly in
    /// `[0, container - item]` on each axis. Returns `None`, recording
    /// nothing, when the item does not fit or every sample collided.
    pub fn try_place(&mut self) -> Option<Rect> {
        let max_x = self.container_width.checked_sub(self.item_width)?;
        let max_y = self.container_height.checked_sub(self.item_height)?;

        for attempt in 0..self.retries {
            let candidate = Rect::new(
                self.rng.random_range(0..=max_x),
                self.rng.random_range(0..=max_y),
                self.item_width,
                self.item_height,
            );
            if !self.placed.iter().any(|r| r.intersects(&candidate)) {
                trace!(attempt, x = candidate.x, y = candidate.y, "placed");
                self.placed.push(candidate);
                return Some(candidate);
            }
        }
        None
    }

    /// Forgets every accepted rectangle.
    pub fn reset(&mut self) {
        self.placed.clear();
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    pub fn placed(&self) -> &[Rect] {
        &self.placed
    }
}
