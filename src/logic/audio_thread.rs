//! Dedicated audio thread, one per playback backend instance.
//!
//! The rodio output stream is not `Send`, so it lives on this thread together
//! with the sink. Dropping the owning [`AudioManager`] closes the command
//! channel, which ends the thread and releases the device.

use super::audio::{AudioManager, AudioShared};
use crate::error::{Result, ScoreError};
use crate::system::bus::AudioCommand;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// How often the worker checks whether the sink ran dry.
const DRAIN_POLL: Duration = Duration::from_millis(20);

struct AudioWorker {
    _stream: Option<OutputStream>,
    stream_handle: Option<OutputStreamHandle>,
    sink: Option<Sink>,
    current_path: Option<PathBuf>,
    volume: f32,
    playing: bool,
    shared: Arc<AudioShared>,
    /// True if audio is available, false for silent mode
    has_audio: bool,
}

impl AudioWorker {
    fn new(shared: Arc<AudioShared>, volume: f32) -> Self {
        let (stream, stream_handle) = match OutputStream::try_default() {
            Ok((stream, handle)) => {
                log::info!("AUDIO: Device found, audio enabled");
                (Some(stream), Some(handle))
            }
            Err(e) => {
                log::warn!(
                    "AUDIO: No audio device found ({}), running in silent mode",
                    e
                );
                (None, None)
            }
        };

        Self {
            has_audio: stream.is_some(),
            _stream: stream,
            stream_handle,
            sink: None,
            current_path: None,
            volume,
            playing: false,
            shared,
        }
    }

    fn handle_command(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::Load { path } => {
                self.load_music(&path);
            }
            AudioCommand::Stream { source } => {
                self.current_path = None;
                self.shared.set_format(source.sample_rate(), source.channels());
                self.shared.position.store(0, Ordering::Relaxed);
                self.shared.set_finished(false);
                if let Some(sink) = self.new_sink() {
                    sink.append(AudioMonitor::new(source, self.shared.position.clone()));
                    self.sink = Some(sink);
                }
                self.shared.set_ready();
            }
            AudioCommand::Append {
                samples,
                channels,
                sample_rate,
            } => {
                self.shared.set_format(sample_rate, channels);
                self.shared.set_finished(false);
                if self.sink.is_none() {
                    self.sink = self.new_sink();
                }
                if let Some(sink) = &self.sink {
                    let chunk = SamplesBuffer::new(channels, sample_rate, samples);
                    sink.append(AudioMonitor::new(chunk, self.shared.position.clone()));
                }
            }
            AudioCommand::Clear => {
                if let Some(sink) = self.sink.take() {
                    sink.stop();
                }
                self.shared.position.store(0, Ordering::Relaxed);
                self.shared.set_finished(false);
            }
            AudioCommand::Play => {
                self.playing = true;
                self.shared.set_finished(false);
                if let Some(sink) = &self.sink {
                    sink.play();
                }
            }
            AudioCommand::Pause => {
                self.playing = false;
                if let Some(sink) = &self.sink {
                    sink.pause();
                }
            }
            AudioCommand::Stop => {
                self.playing = false;
                if let Some(sink) = self.sink.take() {
                    sink.stop();
                }
                self.shared.position.store(0, Ordering::Relaxed);
            }
            AudioCommand::Seek { position_secs } => {
                self.seek_to(position_secs);
            }
            AudioCommand::SetVolume { volume } => {
                self.volume = volume;
                if let Some(sink) = &self.sink {
                    sink.set_volume(volume);
                }
            }
        }
    }

    /// Creates a sink honoring the current play state; `None` in silent mode.
    fn new_sink(&self) -> Option<Sink> {
        let stream_handle = self.stream_handle.as_ref()?;
        match Sink::try_new(stream_handle) {
            Ok(sink) => {
                sink.set_volume(self.volume);
                if !self.playing {
                    sink.pause();
                }
                Some(sink)
            }
            Err(e) => {
                log::error!("AUDIO: Failed to create sink: {}", e);
                None
            }
        }
    }

    fn load_music(&mut self, path: &Path) {
        self.current_path = Some(path.to_path_buf());
        self.playing = false;

        match measure_duration(path) {
            Some((duration, sample_rate, channels)) => {
                self.shared.set_format(sample_rate, channels);
                self.shared.set_duration(duration);
                log::info!("AUDIO: {:?} is {:.1}s long", path, duration);
            }
            None => {
                log::error!("AUDIO: Cannot decode file {:?}", path);
                self.shared.set_failed();
                return;
            }
        }

        self.load_from_position(0.0);
        self.shared.set_ready();
    }

    fn load_from_position(&mut self, position_secs: f64) {
        let Some(path) = &self.current_path else {
            return;
        };

        let skipped_samples = (position_secs.max(0.0)
            * self.shared.sample_rate.load(Ordering::Relaxed) as f64
            * self.shared.channels.load(Ordering::Relaxed) as f64) as u64;
        self.shared.position.store(skipped_samples, Ordering::Relaxed);
        self.shared.set_finished(false);

        // Silent mode still tracks the position so seeks stay observable
        if !self.has_audio {
            return;
        }

        if let Some(sink) = self.sink.take() {
            sink.stop();
        }

        let Some(source) = open_decoder(path) else {
            log::error!("AUDIO: Cannot decode file {:?}", path);
            return;
        };
        self.shared.set_format(source.sample_rate(), source.channels());

        let skipped = source.skip_duration(Duration::from_secs_f64(position_secs.max(0.0)));
        let Some(sink) = self.new_sink() else {
            return;
        };
        sink.append(AudioMonitor::new(skipped, self.shared.position.clone()));
        self.sink = Some(sink);
        log::debug!("AUDIO: Loaded from {:.1}s", position_secs);
    }

    fn seek_to(&mut self, position_secs: f64) {
        if self.current_path.is_none() {
            log::debug!("AUDIO: Seek ignored on a streamed source");
            return;
        }
        self.load_from_position(position_secs);
        log::info!("AUDIO: Seeked to {:.1}s", position_secs);
    }

    /// Flags the end of playback once a playing sink has nothing left.
    fn check_drained(&self) {
        if !self.playing || self.shared.is_finished() {
            return;
        }
        let drained = match &self.sink {
            Some(sink) => sink.empty(),
            // Silent mode never plays anything
            None => false,
        };
        if drained {
            log::info!("AUDIO: Playback reached the end");
            self.shared.set_finished(true);
        }
    }
}

fn open_decoder(path: &Path) -> Option<Decoder<BufReader<File>>> {
    let file = File::open(path).ok()?;
    Decoder::new(BufReader::new(file)).ok()
}

/// Duration from the container when known, by decoding everything otherwise.
/// Also returns the sample format.
fn measure_duration(path: &Path) -> Option<(f64, u32, u16)> {
    let source = open_decoder(path)?;
    let sample_rate = source.sample_rate();
    let channels = source.channels();
    if let Some(total) = source.total_duration() {
        return Some((total.as_secs_f64(), sample_rate, channels));
    }
    let samples = source.count() as f64;
    let duration = samples / (sample_rate.max(1) as f64 * channels.max(1) as f64);
    Some((duration, sample_rate, channels))
}

/// Counts the samples handed to the device.
struct AudioMonitor<I> {
    inner: I,
    position_counter: Arc<AtomicU64>,
}

impl<I> AudioMonitor<I> {
    fn new(inner: I, position_counter: Arc<AtomicU64>) -> Self {
        Self {
            inner,
            position_counter,
        }
    }
}

impl<I> Iterator for AudioMonitor<I>
where
    I: Iterator,
{
    type Item = I::Item;
    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next();
        if item.is_some() {
            self.position_counter.fetch_add(1, Ordering::Relaxed);
        }
        item
    }
}

impl<I> Source for AudioMonitor<I>
where
    I: Source,
    I::Item: rodio::Sample,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }
    fn channels(&self) -> u16 {
        self.inner.channels()
    }
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }
    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

fn run_worker(mut worker: AudioWorker, commands: Receiver<AudioCommand>) {
    loop {
        match commands.recv_timeout(DRAIN_POLL) {
            Ok(cmd) => worker.handle_command(cmd),
            Err(RecvTimeoutError::Timeout) => worker.check_drained(),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Starts an audio thread and returns the handle controlling it.
pub fn start_audio_thread(label: &str, volume: f32) -> Result<AudioManager> {
    let (cmd_tx, cmd_rx) = unbounded();
    let shared = Arc::new(AudioShared::default());
    let worker_shared = shared.clone();
    let name = format!("Audio Thread ({})", label);

    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            log::info!("AUDIO: {} started", name);
            let worker = AudioWorker::new(worker_shared, volume);
            run_worker(worker, cmd_rx);
            log::info!("AUDIO: {} stopped", name);
        })
        .map_err(|e| ScoreError::Audio(format!("failed to spawn audio thread: {}", e)))?;

    Ok(AudioManager::new(cmd_tx, shared))
}

/// Writes a mono 16-bit PCM WAV of `secs` seconds of silence.
#[cfg(test)]
pub(crate) fn write_silent_wav(path: &Path, secs: f64) {
    use std::io::Write;
        let rate: u32 = 8000;
        let samples = (rate as f64 * secs) as u32;
        let data_len = samples * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);
    File::create(path).unwrap().write_all(&bytes).unwrap();
}
