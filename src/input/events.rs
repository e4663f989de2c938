//! Keyboard events and the actions a host can send to a score display.

use std::str::FromStr;

/// Keys the display reacts to; everything else arrives as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    Char(char),
    Other,
}

impl FromStr for Key {
    type Err = std::convert::Infallible;

    /// Parses DOM-style key names (`" "`, `"ArrowLeft"`, `"s"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            " " | "Space" | "space" => Key::Space,
            "ArrowLeft" | "left" => Key::ArrowLeft,
            "ArrowRight" | "right" => Key::ArrowRight,
            _ => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c.to_ascii_lowercase()),
                    _ => Key::Other,
                }
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyInput {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayAction {
    // Transport
    TogglePlay,
    Stop,
    SeekBy(f64),
    SeekTo(f64),
    /// Progress bar click, as a share of the duration.
    SeekRatio(f64),
    NextTrack,
    SelectTrack(usize),

    // View
    ToggleAutoScroll,
    ToggleZoom,
    /// The user scrolled the container.
    Scrolled(f64),

    // Score interaction
    ClickElement(String),
    /// Click at a page-local point; resolved against the position index.
    ClickPage { page: usize, x: f64, y: f64 },
}
