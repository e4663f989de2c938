//! Audio manager that sends commands to a dedicated audio thread.
//!
//! This module provides a thread-safe interface for controlling audio playback
//! without blocking the frame loop.

use crate::system::bus::AudioCommand;
use crossbeam_channel::Sender;
use rodio::Source;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

const STATUS_LOADING: u8 = 0;
const STATUS_READY: u8 = 1;
const STATUS_FAILED: u8 = 2;

/// Marks an unknown duration in [`AudioShared::duration_ms`].
const NO_DURATION: u64 = u64::MAX;

/// State written by the audio thread and read by the frame thread.
#[derive(Debug)]
pub struct AudioShared {
    /// Samples handed to the device (all channels).
    pub position: Arc<AtomicU64>,
    pub sample_rate: AtomicU64,
    pub channels: AtomicU64,
    duration_ms: AtomicU64,
    status: AtomicU8,
    finished: AtomicBool,
}

impl Default for AudioShared {
    fn default() -> Self {
        Self {
            position: Arc::new(AtomicU64::new(0)),
            sample_rate: AtomicU64::new(44100),
            channels: AtomicU64::new(2),
            duration_ms: AtomicU64::new(NO_DURATION),
            status: AtomicU8::new(STATUS_LOADING),
            finished: AtomicBool::new(false),
        }
    }
}

impl AudioShared {
    pub(crate) fn set_format(&self, sample_rate: u32, channels: u16) {
        self.sample_rate
            .store(sample_rate as u64, Ordering::Relaxed);
        self.channels.store(channels as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_duration(&self, secs: f64) {
        self.duration_ms
            .store((secs.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_ready(&self) {
        self.status.store(STATUS_READY, Ordering::Release);
    }

    pub(crate) fn set_failed(&self) {
        self.status.store(STATUS_FAILED, Ordering::Release);
    }

    pub(crate) fn set_finished(&self, finished: bool) {
        self.finished.store(finished, Ordering::Relaxed);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Wrapper for sending commands to the audio thread.
///
/// The `AudioManager` does not perform audio operations directly.
/// Instead, it sends commands through a channel to its audio thread,
/// ensuring non-blocking audio control from the frame thread.
/// Dropping it stops the thread.
pub struct AudioManager {
    cmd_tx: Sender<AudioCommand>,
    shared: Arc<AudioShared>,
}

impl AudioManager {
    pub(crate) fn new(cmd_tx: Sender<AudioCommand>, shared: Arc<AudioShared>) -> Self {
        Self { cmd_tx, shared }
    }

    fn send(&self, cmd: AudioCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            log::warn!("AUDIO: Audio thread is gone, command dropped");
        }
    }

    /// Loads an audio file for playback. Progress is reported through
    /// [`AudioManager::is_ready`] and [`AudioManager::is_failed`].
    pub fn load(&self, path: &Path) {
        self.send(AudioCommand::Load {
            path: path.to_path_buf(),
        });
    }

    /// Plays a generated source; seeking is up to the producer.
    pub fn stream(&self, source: Box<dyn Source<Item = f32> + Send>) {
        self.send(AudioCommand::Stream { source });
    }

    /// Queues interleaved samples behind what is already playing.
    pub fn append(&self, samples: Vec<f32>, channels: u16, sample_rate: u32) {
        self.send(AudioCommand::Append {
            samples,
            channels,
            sample_rate,
        });
    }

    /// Drops everything queued and resets the position counter.
    pub fn clear(&self) {
        self.send(AudioCommand::Clear);
    }

    /// Starts audio playback.
    pub fn play(&self) {
        self.send(AudioCommand::Play);
    }

    /// Pauses audio playback.
    pub fn pause(&self) {
        self.send(AudioCommand::Pause);
    }

    /// Stops playback and resets position.
    pub fn stop(&self) {
        self.send(AudioCommand::Stop);
    }

    /// Sets the master volume (0.0 to 1.0).
    pub fn set_volume(&self, volume: f32) {
        self.send(AudioCommand::SetVolume { volume });
    }

    /// Seeks to a position in seconds.
    ///
    /// This operation is non-blocking; the audio thread handles the seek asynchronously.
    pub fn seek(&self, position_seconds: f64) {
        self.send(AudioCommand::Seek {
            position_secs: position_seconds,
        });
    }

    /// Returns the current playback position in seconds.
    ///
    /// The position is calculated from the sample count shared atomically
    /// with the audio thread.
    pub fn position_seconds(&self) -> f64 {
        let samples = self.shared.position.load(Ordering::Relaxed) as f64;
        let sample_rate = self.shared.sample_rate.load(Ordering::Relaxed).max(1) as f64;
        let channels = self.shared.channels.load(Ordering::Relaxed).max(1) as f64;

        samples / (sample_rate * channels)
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match self.shared.duration_ms.load(Ordering::Relaxed) {
            NO_DURATION => None,
            ms => Some(ms as f64 / 1000.0),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.status.load(Ordering::Acquire) == STATUS_READY
    }

    pub fn is_failed(&self) -> bool {
        self.shared.status.load(Ordering::Acquire) == STATUS_FAILED
    }

    /// True once a playing source ran out of samples.
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }
}
