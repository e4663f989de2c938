//! Interactive score display core.
//!
//! Page graphics of a score are loaded page by page while a playback engine
//! (sampled audio, MIDI or streamed synthesis) runs; every frame the playback
//! time is mapped to the score element being played, which is highlighted and
//! scrolled into view. Clicking an element seeks the audio to it.

pub mod config;
pub mod error;
pub mod host;
pub mod input;
pub mod loader;
pub mod logic;
pub mod models;
pub mod shared;
pub mod state;
pub mod system;

pub use config::DisplayConfig;
pub use error::{Result, ScoreError};
pub use state::ScoreDisplay;
