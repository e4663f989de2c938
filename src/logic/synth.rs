//! MIDI synthesis engines built on rustysynth.
//!
//! [`SynthSequencer`] plays a MIDI file live through an audio thread, and
//! [`MidiChunkSynthesizer`] renders it ahead in chunks for the streaming
//! backend. The rustysynth sequencer cannot jump, so starting at an offset
//! renders silently up to it. For live playback that happens on the audio
//! thread, never on the caller's.

use super::audio::AudioManager;
use super::audio_thread::start_audio_thread;
use super::backend::{ChunkOutput, ChunkStream, NoteSequencer, ScoreSynthesizer};
use crate::config::SynthConfig;
use crate::error::{Result, ScoreError};
use rodio::Source;
use rustysynth::{MidiFile, MidiFileSequencer, SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frames rendered per block by the live source.
const LIVE_BLOCK: usize = 1024;
/// Frames rendered per step while fast-forwarding.
const SKIP_BLOCK: usize = 4096;
/// Seeks closer than this to the current position are ignored.
const SEEK_TOLERANCE: f64 = 0.05;

pub fn load_soundfont(path: &Path) -> Result<Arc<SoundFont>> {
    let file = File::open(path).map_err(|e| ScoreError::io(path, e))?;
    let soundfont = SoundFont::new(&mut BufReader::new(file))
        .map_err(|e| ScoreError::Audio(format!("invalid SoundFont {}: {}", path.display(), e)))?;
    Ok(Arc::new(soundfont))
}

pub fn load_midi(path: &Path) -> Result<Arc<MidiFile>> {
    let file = File::open(path).map_err(|e| ScoreError::io(path, e))?;
    let midi = MidiFile::new(&mut BufReader::new(file))
        .map_err(|e| ScoreError::Audio(format!("invalid MIDI file {}: {}", path.display(), e)))?;
    Ok(Arc::new(midi))
}

/// A sequencer bound to one MIDI file.
struct MidiRenderer {
    sequencer: MidiFileSequencer,
    midi: Arc<MidiFile>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl MidiRenderer {
    fn new(soundfont: &Arc<SoundFont>, midi: Arc<MidiFile>, sample_rate: u32) -> Result<Self> {
        let settings = SynthesizerSettings::new(sample_rate as i32);
        let synthesizer = Synthesizer::new(soundfont, &settings)
            .map_err(|e| ScoreError::Audio(format!("cannot create synthesizer: {}", e)))?;
        let mut sequencer = MidiFileSequencer::new(synthesizer);
        sequencer.play(&midi, false);

        Ok(Self {
            sequencer,
            midi,
            left: Vec::new(),
            right: Vec::new(),
        })
    }

    fn position(&self) -> f64 {
        self.sequencer.get_position()
    }

    fn length(&self) -> f64 {
        self.midi.get_length()
    }

    fn finished(&self) -> bool {
        self.position() >= self.length()
    }

    fn restart_at(&mut self, secs: f64) {
        self.sequencer.play(&self.midi, false);
        let target = secs.min(self.length());
        while self.position() < target {
            self.render_planar(SKIP_BLOCK);
        }
    }

    fn render_planar(&mut self, frames: usize) {
        self.left.resize(frames, 0.0);
        self.right.resize(frames, 0.0);
        self.sequencer.render(&mut self.left, &mut self.right);
    }

    /// Renders `frames` stereo frames, interleaved.
    fn render_block(&mut self, frames: usize) -> Vec<f32> {
        self.render_planar(frames);
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(l, r)| [*l, *r])
            .collect()
    }
}

/// Position of a live sequence, shared with its audio thread.
///
/// Seeks are requested here and applied by the audio thread before its next
/// block. Until then the requested target is reported as the position.
#[derive(Debug, Default)]
struct SequencerClock {
    /// Last rendered position, as `f64` bits.
    rendered: AtomicU64,
    pending: Mutex<Option<f64>>,
}

impl SequencerClock {
    fn request(&self, secs: f64) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(secs);
        }
    }

    fn pending(&self) -> Option<f64> {
        self.pending.lock().ok().and_then(|pending| *pending)
    }

    fn publish(&self, secs: f64) {
        self.rendered.store(secs.to_bits(), Ordering::Release);
    }

    /// Publishes the position reached for `target`. A newer request stays pending.
    fn settle(&self, target: f64, secs: f64) {
        self.publish(secs);
        if let Ok(mut pending) = self.pending.lock() {
            if *pending == Some(target) {
                *pending = None;
            }
        }
    }

    fn position(&self) -> f64 {
        self.pending()
            .unwrap_or_else(|| f64::from_bits(self.rendered.load(Ordering::Acquire)))
    }
}

/// Endless rodio source rendering blocks on the audio thread.
struct SequencerSource {
    renderer: MidiRenderer,
    clock: Arc<SequencerClock>,
    buffer: Vec<f32>,
    cursor: usize,
    sample_rate: u32,
}

impl Iterator for SequencerSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.cursor >= self.buffer.len() {
            if let Some(target) = self.clock.pending() {
                self.renderer.restart_at(target);
                self.clock.settle(target, self.renderer.position());
            }
            self.buffer = self.renderer.render_block(LIVE_BLOCK);
            self.clock.publish(self.renderer.position());
            self.cursor = 0;
        }
        let sample = self.buffer.get(self.cursor).copied();
        self.cursor += 1;
        sample
    }
}

impl Source for SequencerSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }
    fn channels(&self) -> u16 {
        2
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Live MIDI playback: the sequencer renders while the audio thread pulls.
pub struct SynthSequencer {
    clock: Arc<SequencerClock>,
    audio: AudioManager,
    duration: f64,
    started: bool,
}

impl SynthSequencer {
    pub fn open(midi: &Path, soundfont: &Path, config: &SynthConfig, volume: f32) -> Result<Self> {
        let soundfont = load_soundfont(soundfont)?;
        let midi = load_midi(midi)?;
        let duration = midi.get_length();
        let renderer = MidiRenderer::new(&soundfont, midi, config.sample_rate)?;
        let clock = Arc::new(SequencerClock::default());

        let audio = start_audio_thread("midi", volume)?;
        audio.stream(Box::new(SequencerSource {
            renderer,
            clock: clock.clone(),
            buffer: Vec::new(),
            cursor: 0,
            sample_rate: config.sample_rate,
        }));
        log::info!("AUDIO: MIDI sequence of {:.1}s ready", duration);

        Ok(Self {
            clock,
            audio,
            duration,
            started: false,
        })
    }
}

impl NoteSequencer for SynthSequencer {
    fn is_ready(&self) -> bool {
        self.audio.is_ready()
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn start(&mut self) {
        self.started = true;
        self.audio.play();
    }

    fn stop(&mut self) {
        self.started = false;
        self.audio.pause();
    }

    fn position(&self) -> f64 {
        self.clock.position().min(self.duration)
    }

    fn set_position(&mut self, secs: f64) {
        if !self.started {
            return;
        }
        if (self.clock.position() - secs).abs() > SEEK_TOLERANCE {
            self.clock.request(secs.clamp(0.0, self.duration));
        }
    }

    fn is_finished(&self) -> bool {
        self.position() >= self.duration
    }
}

/// Chunked rendering for [`super::backend::StreamingBackend`].
pub struct MidiChunkSynthesizer {
    soundfont: Arc<SoundFont>,
    midi: Arc<MidiFile>,
    sample_rate: u32,
    chunk_frames: usize,
}

impl MidiChunkSynthesizer {
    pub fn open(midi: &Path, soundfont: &Path, config: &SynthConfig) -> Result<Self> {
        Ok(Self {
            soundfont: load_soundfont(soundfont)?,
            midi: load_midi(midi)?,
            sample_rate: config.sample_rate,
            chunk_frames: ((config.sample_rate as f64 * config.chunk_secs) as usize).max(1),
        })
    }
}

struct MidiChunks {
    renderer: MidiRenderer,
    chunk_frames: usize,
}

impl Iterator for MidiChunks {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Vec<f32>> {
        if self.renderer.finished() {
            return None;
        }
        Some(self.renderer.render_block(self.chunk_frames))
    }
}

impl ScoreSynthesizer for MidiChunkSynthesizer {
    fn duration(&self) -> f64 {
        self.midi.get_length()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        2
    }

    fn render_from(&self, offset: f64) -> Result<Box<dyn ChunkStream>> {
        let mut renderer = MidiRenderer::new(&self.soundfont, self.midi.clone(), self.sample_rate)?;
        renderer.restart_at(offset);
        Ok(Box::new(MidiChunks {
            renderer,
            chunk_frames: self.chunk_frames,
        }))
    }
}

/// Chunk output playing through its own audio thread.
pub struct RodioChunkOutput {
    audio: AudioManager,
}

impl RodioChunkOutput {
    pub fn new(volume: f32) -> Result<Self> {
        Ok(Self {
            audio: start_audio_thread("synth", volume)?,
        })
    }
}

impl ChunkOutput for RodioChunkOutput {
    fn append(&mut self, samples: Vec<f32>, channels: u16, sample_rate: u32) {
        self.audio.append(samples, channels, sample_rate);
    }

    fn clear(&mut self) {
        self.audio.clear();
    }

    fn play(&mut self) {
        self.audio.play();
    }

    fn pause(&mut self) {
        self.audio.pause();
    }

    fn played_secs(&self) -> f64 {
        self.audio.position_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_soundfont_is_an_audio_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.sf2");
        std::fs::write(&path, b"RIFF----nope").unwrap();
        assert!(matches!(load_soundfont(&path), Err(ScoreError::Audio(_))));
    }

    #[test]
    fn test_missing_midi_is_an_io_error() {
        assert!(matches!(
            load_midi(Path::new("/nonexistent/score.mid")),
            Err(ScoreError::Io { .. })
        ));
    }

    #[test]
    fn test_invalid_midi_is_an_audio_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("score.mid");
        std::fs::write(&path, b"MThd\0\0\0\x06").unwrap();
        assert!(matches!(load_midi(&path), Err(ScoreError::Audio(_))));
    }

    #[test]
    fn test_seek_is_reported_until_the_audio_thread_applies_it() {
        let clock = SequencerClock::default();
        clock.publish(3.0);
        assert_eq!(clock.position(), 3.0);

        clock.request(40.0);
        assert_eq!(clock.position(), 40.0);

        // A newer seek arrives while the first one is rendered
        clock.request(12.0);
        clock.settle(40.0, 40.0);
        assert_eq!(clock.pending(), Some(12.0));
        assert_eq!(clock.position(), 12.0);

        clock.settle(12.0, 12.01);
        assert_eq!(clock.pending(), None);
        assert_eq!(clock.position(), 12.01);
    }

    #[test]
    fn test_chunk_output_starts_silent() {
        let output = RodioChunkOutput::new(0.0).unwrap();
        assert_eq!(output.played_secs(), 0.0);
    }
}
