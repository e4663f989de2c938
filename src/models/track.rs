//! Tracks and downloadable artifacts declared by the host.

use crate::error::ScoreError;
use std::str::FromStr;

/// Which engine plays a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Pre-rendered audio file (ogg, mp3, wav, flac).
    Audio,
    /// MIDI file synthesized with a SoundFont.
    Midi,
    /// Audio synthesized incrementally from the score itself.
    Synth,
}

impl FromStr for EngineKind {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "audio" => Ok(EngineKind::Audio),
            "midi" => Ok(EngineKind::Midi),
            "synth" | "synthesis" => Ok(EngineKind::Synth),
            other => Err(ScoreError::UnsupportedEngine(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    pub src: String,
    pub engine: EngineKind,
    /// SoundFont used by the MIDI and synthesis engines.
    pub soundfont: Option<String>,
}

impl Track {
    pub fn audio(name: &str, src: &str) -> Self {
        Self {
            name: name.to_string(),
            src: src.to_string(),
            engine: EngineKind::Audio,
            soundfont: None,
        }
    }
}

/// A download link listed next to the score.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactLink {
    pub label: String,
    pub href: String,
}
