//! Sampled audio files played through rodio.

use super::{BackendEvent, LocalFile, PlaybackBackend};
use crate::error::Result;
use crate::logic::audio::AudioManager;
use crate::logic::audio_thread::start_audio_thread;

pub struct SampledBackend {
    audio: AudioManager,
    /// Keeps downloaded sources alive while the engine plays them.
    _file: LocalFile,
    playing: bool,
    ready_sent: bool,
    failure_logged: bool,
}

impl SampledBackend {
    pub(crate) fn open(file: LocalFile, volume: f32) -> Result<Self> {
        let audio = start_audio_thread("sampled", volume)?;
        audio.load(file.path());
        Ok(Self {
            audio,
            _file: file,
            playing: false,
            ready_sent: false,
            failure_logged: false,
        })
    }
}

impl PlaybackBackend for SampledBackend {
    fn play(&mut self) {
        self.playing = true;
        self.audio.play();
    }

    fn pause(&mut self) {
        self.playing = false;
        self.audio.pause();
    }

    fn seek(&mut self, target: Option<f64>) -> f64 {
        match target {
            Some(target) => {
                let target = match self.audio.duration_secs() {
                    Some(duration) => target.clamp(0.0, duration),
                    None => target.max(0.0),
                };
                self.audio.seek(target);
                target
            }
            None => self.audio.position_seconds(),
        }
    }

    fn duration(&self) -> Option<f64> {
        self.audio.duration_secs()
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn loaded_ratio(&self) -> f64 {
        if self.audio.is_ready() { 1.0 } else { 0.0 }
    }

    fn poll(&mut self) -> Vec<BackendEvent> {
        let mut events = Vec::new();

        if !self.ready_sent && self.audio.is_ready() {
            self.ready_sent = true;
            events.push(BackendEvent::Ready);
        }
        if !self.failure_logged && self.audio.is_failed() {
            self.failure_logged = true;
            log::error!("AUDIO: Track failed to load, it stays silent");
        }

        if self.playing && self.audio.is_finished() {
            // Park at the end like a media element does
            self.pause();
            if let Some(duration) = self.audio.duration_secs() {
                self.audio.seek(duration);
            }
            events.push(BackendEvent::Ended);
        }

        events
    }
}
