//! Display configuration.
//!
//! Every section is optional in the TOML file; missing keys fall back to the
//! defaults below, which reproduce the behavior of the web component.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Load a TOML file and deserialize it
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    match toml::from_str(&content) {
        Ok(data) => Ok(data),
        Err(e) => {
            log::error!("Failed to parse TOML file {:?}: {}", path, e);
            Err(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub loader: LoaderConfig,
    pub positions: PositionConfig,
    pub viewport: ViewportConfig,
    pub playback: PlaybackConfig,
    pub synth: SynthConfig,
    pub source: SourceLayout,
}

impl DisplayConfig {
    /// Loads the configuration, falling back to defaults when the file is missing
    /// or malformed.
    pub fn load(path: &Path) -> Self {
        match load_toml(path) {
            Ok(config) => {
                log::info!("CONFIG: Loaded {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("CONFIG: Using defaults ({})", e);
                Self::default()
            }
        }
    }
}

/// Page scheduling knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum number of pages loading at once.
    pub max_in_flight: usize,
    /// Fixed delay before a failed page becomes eligible again.
    pub retry_delay_ms: u64,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 3,
            retry_delay_ms: 1000,
            max_retries: None,
        }
    }
}

/// Position table normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PositionConfig {
    /// Raw position units per page pixel.
    pub scale: f64,
    /// Minimum element width and height after scaling.
    pub min_hit_size: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            scale: 12.0,
            min_hit_size: 64.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewportConfig {
    /// Left padding used when aligning a page, as a ratio of the page width.
    pub left_padding_ratio: f64,
    pub auto_scroll: bool,
    pub zoomed: bool,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            left_padding_ratio: 0.20,
            auto_scroll: true,
            zoomed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Step used by the arrow keys, in seconds.
    pub seek_step_secs: f64,
    /// Frame loop rate.
    pub frame_rate: u32,
    pub volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            seek_step_secs: 2.0,
            frame_rate: 60,
            volume: 1.0,
        }
    }
}

/// Streaming synthesis and MIDI rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthConfig {
    pub sample_rate: u32,
    /// Length of one synthesized chunk.
    pub chunk_secs: f64,
    /// Capacity of the synthesis queue, in chunks.
    pub queue_chunks: usize,
    /// SoundFont for tracks that do not name one.
    pub soundfont: Option<String>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            chunk_secs: 0.5,
            queue_chunks: 4,
            soundfont: None,
        }
    }
}

/// File names of the pre-rendered directory protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceLayout {
    pub meta_file: String,
    /// `{n}` is replaced by the 1-based page number.
    pub graphic_pattern: String,
    pub positions_file: String,
}

impl SourceLayout {
    pub fn graphic_file(&self, index: usize) -> String {
        self.graphic_pattern.replace("{n}", &(index + 1).to_string())
    }
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            meta_file: "meta.metajson".to_string(),
            graphic_pattern: "graphic-{n}.svg".to_string(),
            positions_file: "measures.mpos".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: DisplayConfig = toml::from_str(
            r#"
            [loader]
            retry_delay_ms = 250

            [positions]
            min_hit_size = 32.0
            "#,
        )
        .unwrap();

        assert_eq!(config.loader.retry_delay_ms, 250);
        assert_eq!(config.loader.max_in_flight, 3);
        assert_eq!(config.positions.min_hit_size, 32.0);
        assert_eq!(config.positions.scale, 12.0);
        assert!(config.viewport.auto_scroll);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[loader\nmax_in_flight = ").unwrap();
        assert_eq!(DisplayConfig::load(file.path()), DisplayConfig::default());
    }

    #[test]
    fn test_graphic_file_is_one_based() {
        let layout = SourceLayout::default();
        assert_eq!(layout.graphic_file(0), "graphic-1.svg");
        assert_eq!(layout.graphic_file(9), "graphic-10.svg");
    }
}
