//! Keyboard surface: raw key events and their bindings.

pub mod bindings;
pub mod events;

pub use bindings::KeyBindings;
pub use events::{DisplayAction, Key, KeyInput, Modifiers};
