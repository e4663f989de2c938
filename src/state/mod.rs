//! Display state.
//!
//! - `ScoreDisplay` - one score with its tracks, highlight and viewport
//!
//! The display implements the common traits for snapshots and action handling.

pub mod display;
pub mod traits;

pub use display::ScoreDisplay;
pub use traits::{HandleAction, Snapshot};
