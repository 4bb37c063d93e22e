//! Scatters fixed-size rectangles inside a container without overlap.
//!
//! [`PlacementEngine`] samples random top-left corners and keeps the first
//! candidate that does not intersect anything already accepted. There is
//! no backtracking: call order decides priority. [`CaptchaLayout`] uses it
//! to hide one target among decoys, placing the target last so it ends up
//! on top.

mod engine;
mod layout;
mod rect;

pub use engine::{DEFAULT_RETRIES, PlacementEngine};
pub use layout::{CaptchaLayout, LayoutConfig, LayoutError, Placed};
pub use rect::Rect;
