//! Render snapshots for the page renderer.
//!
//! Snapshots are immutable captures of the display state. The renderer draws
//! page graphics and the highlight box from them without touching the core.

use crate::logic::viewport::PageLayout;
use crate::models::{ArtifactLink, PageAsset, PlaybackState, ScoreElement, ScoreSource};

/// What the renderer needs to draw one score display.
#[derive(Clone, Debug)]
pub struct DisplaySnapshot {
    pub source: Option<ScoreSource>,
    /// Page states in page order; empty until the metadata is loaded.
    pub pages: Vec<PageAsset>,
    pub layout: Option<PageLayout>,
    /// The metadata failed to load.
    pub errored: bool,

    pub playback: PlaybackState,
    /// Element to outline, with its page-local box.
    pub highlight: Option<ScoreElement>,

    pub tracks: Vec<String>,
    pub selected_track: Option<usize>,
    pub links: Vec<ArtifactLink>,

    pub auto_scroll: bool,
    pub zoomed: bool,
    pub scroll_left: f64,
}

impl DisplaySnapshot {
    pub fn loaded_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_loaded()).count()
    }
}
