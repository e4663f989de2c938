//! Keyboard shortcuts of the score display.

use super::events::{DisplayAction, Key, KeyInput};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct KeyBindings {
    binds: HashMap<Key, DisplayAction>,
}

impl KeyBindings {
    pub fn new(seek_step_secs: f64) -> Self {
        let mut binds = HashMap::new();
        binds.insert(Key::Space, DisplayAction::TogglePlay);
        binds.insert(Key::ArrowLeft, DisplayAction::SeekBy(-seek_step_secs));
        binds.insert(Key::ArrowRight, DisplayAction::SeekBy(seek_step_secs));
        binds.insert(Key::Char('s'), DisplayAction::ToggleAutoScroll);
        binds.insert(Key::Char('z'), DisplayAction::ToggleZoom);
        Self { binds }
    }

    /// Action bound to a key press. Presses with a modifier held, or while the
    /// display does not have focus, belong to someone else.
    pub fn resolve(&self, input: &KeyInput, focused: bool) -> Option<DisplayAction> {
        if !focused || input.modifiers.any() {
            return None;
        }
        self.binds.get(&input.key).cloned()
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new(2.0)
    }
}
