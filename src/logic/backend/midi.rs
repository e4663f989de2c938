//! MIDI playback over a note sequencer.
//!
//! A sequencer only moves its position while it is running, so a seek issued
//! while paused is stored and applied right after the next start.

use super::{BackendEvent, PlaybackBackend};

/// Engine contract of a MIDI sequencer.
pub trait NoteSequencer: Send {
    fn is_ready(&self) -> bool;
    fn duration(&self) -> f64;
    fn start(&mut self);
    fn stop(&mut self);
    fn position(&self) -> f64;
    /// Only meaningful while started.
    fn set_position(&mut self, secs: f64);
    fn is_finished(&self) -> bool;
}

pub struct MidiBackend {
    sequencer: Box<dyn NoteSequencer>,
    playing: bool,
    deferred_seek: Option<f64>,
    ready_sent: bool,
}

impl MidiBackend {
    pub fn new(sequencer: Box<dyn NoteSequencer>) -> Self {
        Self {
            sequencer,
            playing: false,
            deferred_seek: None,
            ready_sent: false,
        }
    }
}

impl PlaybackBackend for MidiBackend {
    fn play(&mut self) {
        self.sequencer.start();
        self.playing = true;
        if let Some(target) = self.deferred_seek.take() {
            log::debug!("AUDIO: Applying deferred MIDI seek to {:.2}s", target);
            self.sequencer.set_position(target);
        }
    }

    fn pause(&mut self) {
        if self.playing {
            // Keep the position so a later play resumes from here
            self.deferred_seek.get_or_insert(self.sequencer.position());
        }
        self.sequencer.stop();
        self.playing = false;
    }

    fn seek(&mut self, target: Option<f64>) -> f64 {
        let Some(target) = target else {
            return match (self.playing, self.deferred_seek) {
                (false, Some(deferred)) => deferred,
                _ => self.sequencer.position(),
            };
        };

        let target = target.clamp(0.0, self.sequencer.duration().max(0.0));
        if self.playing {
            self.sequencer.set_position(target);
        } else {
            self.deferred_seek = Some(target);
        }
        target
    }

    fn duration(&self) -> Option<f64> {
        self.sequencer
            .is_ready()
            .then(|| self.sequencer.duration())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn loaded_ratio(&self) -> f64 {
        if self.sequencer.is_ready() { 1.0 } else { 0.0 }
    }

    fn poll(&mut self) -> Vec<BackendEvent> {
        let mut events = Vec::new();

        if !self.ready_sent && self.sequencer.is_ready() {
            self.ready_sent = true;
            events.push(BackendEvent::Ready);
        }

        if self.playing && self.sequencer.is_finished() {
            self.sequencer.stop();
            self.playing = false;
            self.deferred_seek = Some(self.sequencer.duration());
            events.push(BackendEvent::Ended);
        }

        events
    }
}
