//! Data model shared by the loader, the sync engine and the display.

pub mod page;
pub mod playback;
pub mod position;
pub mod score;
pub mod track;

pub use page::{PageAsset, PageGraphic};
pub use playback::PlaybackState;
pub use position::{PositionIndex, ScoreElement, ScoreEvent};
pub use score::{Locator, PageFormat, ScoreMeta, ScoreSource, SourceType};
pub use track::{ArtifactLink, EngineKind, Track};
