//! Captcha scene layout: one target hidden among decoys.

use rand::Rng;
use tracing::debug;

use crate::{DEFAULT_RETRIES, PlacementEngine, Rect};

/// Scene dimensions and population.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub width: u32,
    pub height: u32,
    /// Side length of every (square) sprite.
    pub sprite_size: u32,
    /// Number of sprite kinds. One becomes the target, the rest decoys.
    pub kinds: u8,
    pub decoys_per_kind: u32,
    pub retries: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 2816,
            height: 1536,
            sprite_size: 50,
            kinds: 4,
            decoys_per_kind: 30,
            retries: DEFAULT_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("need at least one sprite kind")]
    NoKinds,

    #[error("no free slot left for the target")]
    TargetUnplaced,
}

/// A sprite of a given kind at a given spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placed {
    pub kind: u8,
    pub rect: Rect,
}

/// A generated scene. Decoys are in placement order; the target was
/// placed after all of them.
#[derive(Debug, Clone)]
pub struct CaptchaLayout {
    pub width: u32,
    pub height: u32,
    pub sprite_size: u32,
    pub target: Placed,
    pub decoys: Vec<Placed>,
}

impl CaptchaLayout {
    /// Builds a scene.
    ///
    /// Picks a random target kind, places up to `decoys_per_kind` of every
    /// other kind, then the target. A decoy kind that runs out of room is
    /// cut short; the remaining kinds still get their turn.
    ///
    /// # Errors
    /// [`LayoutError::TargetUnplaced`] if no slot is left for the target.
    pub fn generate<R: Rng>(config: &LayoutConfig, mut rng: R) -> Result<Self, LayoutError> {
        if config.kinds == 0 {
            return Err(LayoutError::NoKinds);
        }
        let target_kind = rng.random_range(0..config.kinds);
        let size = config.sprite_size;
        let mut engine = PlacementEngine::new(
            (config.width, config.height),
            (size, size),
            config.retries,
            rng,
        );

        let mut decoys = Vec::new();
        for kind in (0..config.kinds).filter(|k| *k != target_kind) {
            for placed in 0..config.decoys_per_kind {
                let Some(rect) = engine.try_place() else {
                    debug!(kind, placed, "decoy kind cut short");
                    break;
                };
                decoys.push(Placed { kind, rect });
            }
        }

        let rect = engine.try_place().ok_or(LayoutError::TargetUnplaced)?;
        Ok(Self {
            width: config.width,
            height: config.height,
            sprite_size: size,
            target: Placed { kind: target_kind, rect },
            decoys,
        })
    }

    /// Where a click counts as finding the target.
    pub fn answer(&self) -> (u32, u32) {
        self.target.rect.center()
    }

    /// Every sprite, target last.
    pub fn sprites(&self) -> impl Iterator<Item = &Placed> {
        self.decoys.iter().chain(std::iter::once(&self.target))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_default_layout_places_all_sprites() {
        let layout =
            CaptchaLayout::generate(&LayoutConfig::default(), StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(layout.decoys.len(), 90);
        assert!(layout.decoys.iter().all(|d| d.kind != layout.target.kind));
        assert_eq!(layout.sprites().count(), 91);
        assert_eq!(layout.sprites().last(), Some(&layout.target));
    }

    #[test]
    fn test_answer_is_target_centre() {
        let layout =
            CaptchaLayout::generate(&LayoutConfig::default(), StdRng::seed_from_u64(9)).unwrap();
        let r = layout.target.rect;
        assert_eq!(layout.answer(), (r.x + 25, r.y + 25));
    }

    #[test]
    fn test_tiny_scene_cannot_place_target() {
        let config = LayoutConfig { width: 10, height: 10, ..Default::default() };
        let err = CaptchaLayout::generate(&config, StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(err, LayoutError::TargetUnplaced);
    }

    #[test]
    fn test_zero_kinds_rejected() {
        let config = LayoutConfig { kinds: 0, ..Default::default() };
        assert_eq!(
            CaptchaLayout::generate(&config, StdRng::seed_from_u64(1)).unwrap_err(),
            LayoutError::NoKinds
        );
    }
}
