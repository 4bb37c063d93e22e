//! Scoring helpers for challenge answers.

/// Default click radius in pixels: half of a 50 px sprite.
pub const DEFAULT_CLICK_TOLERANCE: u32 = 25;

/// Whether a click at `(x, y)` lands within `tolerance` pixels (Euclidean)
/// of the target centre.
pub fn click_hits(target: (i32, i32), click: (i32, i32), tolerance: u32) -> bool {
    let dx = u128::from(click.0.abs_diff(target.0));
    let dy = u128::from(click.1.abs_diff(target.1));
    let r = u128::from(tolerance);
    dx * dx + dy * dy <= r * r
}
