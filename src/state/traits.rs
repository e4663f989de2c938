//! Traits for display state management.

use crate::input::events::DisplayAction;

/// Trait for creating host-facing snapshots.
///
/// Snapshots are immutable captures of state handed to the page renderer.
/// They decouple the display logic from rendering.
pub trait Snapshot {
    /// The snapshot type produced.
    type Output;

    /// Creates an immutable snapshot for rendering.
    fn create_snapshot(&self) -> Self::Output;
}

/// Trait for handling display actions.
pub trait HandleAction {
    fn handle_action(&mut self, action: &DisplayAction);
}
