//! Playback backend adapter.
//!
//! One trait over three engines with different seek semantics:
//! - [`sampled::SampledBackend`]: decoded audio file, seek is always valid.
//! - [`midi::MidiBackend`]: MIDI sequencer, seeks while paused are deferred
//!   until the next `play`.
//! - [`streaming::StreamingBackend`]: incremental synthesis, seeks restart the
//!   synthesis and settle asynchronously.
//!
//! Engines expose no callbacks; lifecycle events are collected by [`PlaybackBackend::poll`]
//! once per frame.

pub mod midi;
pub mod sampled;
pub mod streaming;

use crate::config::{PlaybackConfig, SynthConfig};
use crate::error::{Result, ScoreError};
use crate::loader::source::http_get;
use crate::models::{EngineKind, Locator, Track};
use std::io::Write;
use std::path::{Path, PathBuf};

pub use midi::{MidiBackend, NoteSequencer};
pub use sampled::SampledBackend;
pub use streaming::{ChunkOutput, ChunkStream, ScoreSynthesizer, StreamingBackend};

/// Lifecycle notifications of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// The engine finished loading and accepts commands.
    Ready,
    /// Playback reached the end of the track.
    Ended,
}

pub trait PlaybackBackend: Send {
    fn play(&mut self);
    fn pause(&mut self);
    /// Seeks to `target` and returns the resulting position.
    /// `None` only queries the current position.
    fn seek(&mut self, target: Option<f64>) -> f64;
    /// Track length in seconds, once known.
    fn duration(&self) -> Option<f64>;
    fn is_playing(&self) -> bool;
    /// Share of the track the engine has buffered, in `[0, 1]`.
    fn loaded_ratio(&self) -> f64;
    /// Drains lifecycle events. Called every frame.
    fn poll(&mut self) -> Vec<BackendEvent>;
}

/// Creates a fresh engine for a track. Called on an engine thread.
pub trait BackendFactory: Send + Sync {
    fn create(&self, track: &Track) -> Result<Box<dyn PlaybackBackend>>;
}

/// A track source available on the local file system.
pub(crate) enum LocalFile {
    Path(PathBuf),
    /// Downloaded copy, deleted when dropped.
    Temp(tempfile::NamedTempFile),
}

impl LocalFile {
    /// Resolves `src`, downloading remote sources into a temporary file.
    pub(crate) fn resolve(src: &str) -> Result<Self> {
        match Locator::parse(src) {
            Locator::Path(path) => {
                if !path.is_file() {
                    return Err(ScoreError::Audio(format!("{} not found", path.display())));
                }
                Ok(LocalFile::Path(path))
            }
            Locator::Url(url) => {
                log::info!("AUDIO: Downloading {}", url);
                let bytes = http_get(&url)?;
                let suffix = url
                    .rsplit('/')
                    .next()
                    .and_then(|name| name.rfind('.').map(|dot| name[dot..].to_string()))
                    .unwrap_or_default();
                let mut file = tempfile::Builder::new()
                    .suffix(&suffix)
                    .tempfile()
                    .map_err(|e| ScoreError::io(std::env::temp_dir(), e))?;
                file.write_all(&bytes)
                    .map_err(|e| ScoreError::io(file.path(), e))?;
                Ok(LocalFile::Temp(file))
            }
        }
    }

    pub(crate) fn path(&self) -> &Path {
        match self {
            LocalFile::Path(path) => path,
            LocalFile::Temp(file) => file.path(),
        }
    }
}

/// Engines backed by rodio and rustysynth.
pub struct DefaultBackendFactory {
    playback: PlaybackConfig,
    synth: SynthConfig,
}

impl DefaultBackendFactory {
    pub fn new(playback: PlaybackConfig, synth: SynthConfig) -> Self {
        Self { playback, synth }
    }

    fn soundfont<'a>(&'a self, track: &'a Track) -> Result<&'a str> {
        track
            .soundfont
            .as_deref()
            .or(self.synth.soundfont.as_deref())
            .ok_or_else(|| ScoreError::Audio(format!("track '{}' needs a SoundFont", track.name)))
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, track: &Track) -> Result<Box<dyn PlaybackBackend>> {
        log::info!("PLAYER: Creating {:?} engine for '{}'", track.engine, track.name);
        match track.engine {
            EngineKind::Audio => {
                let file = LocalFile::resolve(&track.src)?;
                Ok(Box::new(SampledBackend::open(file, self.playback.volume)?))
            }
            EngineKind::Midi => {
                let midi = LocalFile::resolve(&track.src)?;
                let soundfont = LocalFile::resolve(self.soundfont(track)?)?;
                let sequencer = crate::logic::synth::SynthSequencer::open(
                    midi.path(),
                    soundfont.path(),
                    &self.synth,
                    self.playback.volume,
                )?;
                Ok(Box::new(MidiBackend::new(Box::new(sequencer))))
            }
            EngineKind::Synth => {
                let midi = LocalFile::resolve(&track.src)?;
                let soundfont = LocalFile::resolve(self.soundfont(track)?)?;
                let synthesizer = crate::logic::synth::MidiChunkSynthesizer::open(
                    midi.path(),
                    soundfont.path(),
                    &self.synth,
                )?;
                let output = crate::logic::synth::RodioChunkOutput::new(self.playback.volume)?;
                Ok(Box::new(StreamingBackend::new(
                    Box::new(synthesizer),
                    Box::new(output),
                    self.synth.queue_chunks,
                )))
            }
        }
    }
}
