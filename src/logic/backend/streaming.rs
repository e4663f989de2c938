//! Streaming synthesis: audio is rendered ahead of the playhead into a bounded
//! queue and handed to a chunk output.
//!
//! Seeking stops the running synthesis task, clears the queue and the output,
//! and restarts synthesis from the target. The call returns at once; until the
//! first chunk of the new task is queued the reported time is the target.

use super::{BackendEvent, PlaybackBackend};
use crate::error::{Result, ScoreError};
use crossbeam_channel::{Receiver, TryRecvError, bounded};
use std::sync::Arc;
use std::thread;

/// Interleaved sample chunks produced by a synthesis run.
pub trait ChunkStream: Iterator<Item = Vec<f32>> + Send {}

impl<T: Iterator<Item = Vec<f32>> + Send> ChunkStream for T {}

/// Synthesizes a score from an arbitrary offset.
pub trait ScoreSynthesizer: Send + Sync {
    fn duration(&self) -> f64;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    /// Called on the synthesis thread; may take a while for late offsets.
    fn render_from(&self, offset: f64) -> Result<Box<dyn ChunkStream>>;
}

/// Where synthesized chunks are played.
pub trait ChunkOutput: Send {
    fn append(&mut self, samples: Vec<f32>, channels: u16, sample_rate: u32);
    /// Drops queued audio and resets [`ChunkOutput::played_secs`].
    fn clear(&mut self);
    fn play(&mut self);
    fn pause(&mut self);
    /// Seconds played since the last clear.
    fn played_secs(&self) -> f64;
}

/// A running synthesis thread. Dropping the receiver stops it at its next chunk.
struct SynthesisTask {
    chunks: Receiver<Result<Vec<f32>>>,
}

impl SynthesisTask {
    fn spawn(synth: Arc<dyn ScoreSynthesizer>, offset: f64, capacity: usize) -> Result<Self> {
        let (tx, rx) = bounded(capacity.max(1));
        thread::Builder::new()
            .name("Synthesis Thread".to_string())
            .spawn(move || {
                log::debug!("SYNTH: Rendering from {:.2}s", offset);
                let stream = match synth.render_from(offset) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };
                for chunk in stream {
                    if tx.send(Ok(chunk)).is_err() {
                        log::debug!("SYNTH: Task from {:.2}s cancelled", offset);
                        return;
                    }
                }
            })
            .map_err(|e| ScoreError::Audio(format!("failed to spawn synthesis: {}", e)))?;

        Ok(Self { chunks: rx })
    }
}

pub struct StreamingBackend {
    synth: Arc<dyn ScoreSynthesizer>,
    output: Box<dyn ChunkOutput>,
    capacity: usize,

    task: Option<SynthesisTask>,
    /// Track time at which the current task started.
    offset: f64,
    /// Seconds queued to the output since the task started.
    queued_secs: f64,
    /// Length of the last synthesized chunk.
    chunk_len: f64,
    /// Seek target until the first chunk of the restarted task is queued.
    restarting: Option<f64>,
    exhausted: bool,

    playing: bool,
    ready_sent: bool,
}

impl StreamingBackend {
    pub fn new(
        synth: Box<dyn ScoreSynthesizer>,
        output: Box<dyn ChunkOutput>,
        capacity: usize,
    ) -> Self {
        let mut backend = Self {
            synth: Arc::from(synth),
            output,
            capacity: capacity.max(1),
            task: None,
            offset: 0.0,
            queued_secs: 0.0,
            chunk_len: 0.0,
            restarting: None,
            exhausted: false,
            playing: false,
            ready_sent: false,
        };
        backend.restart(0.0);
        backend
    }

    fn restart(&mut self, offset: f64) {
        // Dropping the old task disconnects its channel
        self.task = None;
        self.output.pause();
        self.output.clear();
        self.offset = offset;
        self.queued_secs = 0.0;
        self.restarting = Some(offset);
        self.exhausted = false;

        match SynthesisTask::spawn(self.synth.clone(), offset, self.capacity) {
            Ok(task) => self.task = Some(task),
            Err(e) => {
                log::error!("SYNTH: {}", e);
                self.exhausted = true;
            }
        }
    }

    fn chunk_secs(&self, samples: usize) -> f64 {
        let frame = self.synth.channels().max(1) as f64 * self.synth.sample_rate().max(1) as f64;
        samples as f64 / frame
    }

    /// Moves synthesized chunks into the output while it holds less than
    /// `capacity` chunks of unplayed audio.
    fn pump(&mut self, events: &mut Vec<BackendEvent>) {
        let Some(task) = &self.task else {
            return;
        };

        let mut received = Vec::new();
        let mut disconnected = false;
        let mut ahead = (self.queued_secs - self.output.played_secs()).max(0.0);
        let mut chunk_len = self.chunk_len;

        loop {
            if chunk_len > 0.0 && ahead >= self.capacity as f64 * chunk_len - 1e-9 {
                break;
            }
            match task.chunks.try_recv() {
                Ok(Ok(chunk)) => {
                    chunk_len = self.chunk_secs(chunk.len());
                    ahead += chunk_len;
                    received.push(chunk);
                }
                Ok(Err(e)) => {
                    log::error!("SYNTH: Synthesis failed: {}", e);
                    disconnected = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        self.chunk_len = chunk_len;

        let channels = self.synth.channels();
        let sample_rate = self.synth.sample_rate();
        for chunk in received {
            self.queued_secs += self.chunk_secs(chunk.len());
            self.output.append(chunk, channels, sample_rate);

            if self.restarting.take().is_some() {
                if self.playing {
                    self.output.play();
                }
                if !self.ready_sent {
                    self.ready_sent = true;
                    events.push(BackendEvent::Ready);
                }
            }
        }

        if disconnected {
            self.task = None;
            self.exhausted = true;
            if self.restarting.is_some() {
                // Nothing left to synthesize past the target
                self.restarting = None;
                if !self.ready_sent {
                    self.ready_sent = true;
                    events.push(BackendEvent::Ready);
                }
            }
        }
    }

    fn position(&self) -> f64 {
        match self.restarting {
            Some(target) => target,
            None => (self.offset + self.output.played_secs().min(self.queued_secs))
                .min(self.synth.duration()),
        }
    }
}

impl PlaybackBackend for StreamingBackend {
    fn play(&mut self) {
        self.playing = true;
        if self.restarting.is_none() {
            self.output.play();
        }
    }

    fn pause(&mut self) {
        self.playing = false;
        self.output.pause();
    }

    fn seek(&mut self, target: Option<f64>) -> f64 {
        match target {
            Some(target) => {
                let target = target.clamp(0.0, self.synth.duration().max(0.0));
                self.restart(target);
                target
            }
            None => self.position(),
        }
    }

    fn duration(&self) -> Option<f64> {
        Some(self.synth.duration())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn loaded_ratio(&self) -> f64 {
        let duration = self.synth.duration();
        if duration <= 0.0 {
            return 1.0;
        }
        ((self.offset + self.queued_secs) / duration).clamp(0.0, 1.0)
    }

    fn poll(&mut self) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        self.pump(&mut events);

        let drained = self.output.played_secs() >= self.queued_secs - 1e-6;
        if self.playing && self.exhausted && self.restarting.is_none() && drained {
            log::info!("SYNTH: Playback reached the end");
            self.playing = false;
            self.output.pause();
            self.output.clear();
            self.offset = self.synth.duration();
            self.queued_secs = 0.0;
            events.push(BackendEvent::Ended);
        }

        events
    }
}
