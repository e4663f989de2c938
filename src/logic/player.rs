//! Track list and the active playback backend.
//!
//! Switching tracks tears down the old engine after capturing its play state
//! and position. The new engine is built on an engine thread, since creating
//! one may download files and load a SoundFont, and is installed by
//! [`TrackPlayer::frame`] only if no other switch happened in between. It
//! applies the carried state when it reports ready.

use super::backend::{BackendEvent, BackendFactory, PlaybackBackend};
use crate::error::Result;
use crate::models::{PlaybackState, Track};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::thread;

/// Times closer than this to the duration count as "at the end".
const END_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
struct CarryOver {
    selection: u64,
    playing: bool,
    position: Option<f64>,
}

/// An engine finished building on the engine thread.
struct BuiltEngine {
    selection: u64,
    name: String,
    result: Result<Box<dyn PlaybackBackend>>,
}

pub struct TrackPlayer {
    factory: Arc<dyn BackendFactory>,
    tracks: Vec<Track>,
    selected: Option<usize>,
    backend: Option<Box<dyn PlaybackBackend>>,
    /// Bumped on every switch; guards carry-over and built engines against
    /// stale switches.
    selection: u64,
    /// An engine for the current selection is being built.
    loading: bool,
    carry: Option<CarryOver>,
    ready: bool,
    reported_time: Option<f64>,

    built_tx: Sender<BuiltEngine>,
    built_rx: Receiver<BuiltEngine>,
}

impl TrackPlayer {
    pub fn new(factory: Box<dyn BackendFactory>) -> Self {
        let (built_tx, built_rx) = unbounded();
        Self {
            factory: Arc::from(factory),
            tracks: Vec::new(),
            selected: None,
            backend: None,
            selection: 0,
            loading: false,
            carry: None,
            ready: false,
            reported_time: None,
            built_tx,
            built_rx,
        }
    }

    /// Replaces the track list and selects the first track.
    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        log::info!("PLAYER: {} tracks", tracks.len());
        self.tracks = tracks;
        self.selected = None;
        if self.tracks.is_empty() {
            // Engines still being built are now stale
            self.selection += 1;
            self.loading = false;
            self.carry = None;
            self.backend = None;
            self.reported_time = None;
        } else {
            self.select_track(0);
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.selected?)
    }

    pub fn select_track(&mut self, index: usize) {
        let Some(track) = self.tracks.get(index).cloned() else {
            log::warn!("PLAYER: No track {}", index);
            return;
        };
        if self.selected == Some(index) && (self.backend.is_some() || self.loading) {
            return;
        }

        let carry = self.capture();
        if let Some(mut old) = self.backend.take() {
            old.pause();
        }

        self.selection += 1;
        self.selected = Some(index);
        self.ready = false;
        self.carry = carry.map(|c| CarryOver {
            selection: self.selection,
            ..c
        });

        log::info!("PLAYER: Switching to '{}'", track.name);
        self.spawn_engine(track);
    }

    fn spawn_engine(&mut self, track: Track) {
        let factory = self.factory.clone();
        let tx = self.built_tx.clone();
        let selection = self.selection;

        let spawned = thread::Builder::new()
            .name("Engine Thread".to_string())
            .spawn(move || {
                let result = factory.create(&track);
                let _ = tx.send(BuiltEngine {
                    selection,
                    name: track.name,
                    result,
                });
            });
        self.loading = spawned.is_ok();
        if let Err(e) = spawned {
            log::error!("PLAYER: Failed to spawn engine thread: {}", e);
        }
    }

    /// Installs the engine of the current selection once it is built.
    fn install_built(&mut self) {
        while let Ok(built) = self.built_rx.try_recv() {
            if built.selection != self.selection {
                log::debug!("PLAYER: Dropping stale engine for '{}'", built.name);
                continue;
            }
            self.loading = false;
            match built.result {
                Ok(backend) => self.backend = Some(backend),
                Err(e) => {
                    log::error!("PLAYER: Track '{}' is unplayable: {}", built.name, e);
                }
            }
        }
    }

    /// Play state and position of the outgoing engine, best effort.
    fn capture(&self) -> Option<CarryOver> {
        match self.backend.as_ref() {
            Some(backend) if self.ready => Some(CarryOver {
                selection: self.selection,
                playing: backend.is_playing(),
                position: self.reported_time,
            }),
            // Never became ready: pass on what it was supposed to apply
            _ => self.carry,
        }
    }

    /// Carry-over of the engine being built, where commands wait meanwhile.
    fn pending(&mut self) -> Option<&mut CarryOver> {
        if !self.loading {
            return None;
        }
        let selection = self.selection;
        Some(self.carry.get_or_insert(CarryOver {
            selection,
            playing: false,
            position: None,
        }))
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Cycles to the following track.
    pub fn next_track(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let next = self.selected.map_or(0, |i| (i + 1) % self.tracks.len());
        self.select_track(next);
    }

    pub fn is_playing(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_playing())
    }

    pub fn duration(&self) -> Option<f64> {
        self.backend.as_ref()?.duration()
    }

    pub fn reported_time(&self) -> Option<f64> {
        self.reported_time
    }

    pub fn play_pause(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            if let Some(carry) = self.pending() {
                carry.playing = !carry.playing;
            }
            return;
        };
        if backend.is_playing() {
            backend.pause();
            return;
        }

        let at_end = match (self.reported_time, backend.duration()) {
            (Some(time), Some(duration)) => time >= duration - END_EPSILON,
            _ => false,
        };
        if at_end {
            self.reported_time = Some(backend.seek(Some(0.0)));
        }
        backend.play();
    }

    pub fn pause(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.pause();
        } else if let Some(carry) = self.pending() {
            carry.playing = false;
        }
    }

    /// Pauses, rewinds and stops reporting a time.
    pub fn stop(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.pause();
            backend.seek(Some(0.0));
        } else if let Some(carry) = self.pending() {
            carry.playing = false;
            carry.position = None;
        }
        self.reported_time = None;
    }

    /// Seeks to `time`, clamped to `[0, duration]`.
    pub fn set_progress(&mut self, time: f64) {
        let Some(backend) = self.backend.as_mut() else {
            if let Some(carry) = self.pending() {
                carry.position = Some(time.max(0.0));
            }
            return;
        };
        let time = match backend.duration() {
            Some(duration) => time.clamp(0.0, duration),
            None => time.max(0.0),
        };
        self.reported_time = Some(backend.seek(Some(time)));
    }

    pub fn add_progress(&mut self, delta: f64) {
        let current = self.reported_time.unwrap_or(0.0);
        self.set_progress(current + delta);
    }

    /// Seeks to a share of the duration.
    pub fn set_progress_ratio(&mut self, ratio: f64) {
        if let Some(duration) = self.duration() {
            self.set_progress(ratio.clamp(0.0, 1.0) * duration);
        }
    }

    /// Installs a freshly built engine, polls the engine once and returns this
    /// frame's readout.
    pub fn frame(&mut self) -> PlaybackState {
        self.install_built();
        let Some(backend) = self.backend.as_mut() else {
            return PlaybackState::default();
        };

        for event in backend.poll() {
            match event {
                BackendEvent::Ready => {
                    self.ready = true;
                    if let Some(carry) = self.carry.take() {
                        if carry.selection == self.selection {
                            log::debug!("PLAYER: Carrying over {:?}", carry);
                            if let Some(position) = carry.position {
                                self.reported_time = Some(backend.seek(Some(position)));
                            }
                            if carry.playing {
                                backend.play();
                            }
                        }
                    }
                }
                BackendEvent::Ended => {
                    log::info!("PLAYER: Track ended");
                    self.reported_time = backend.duration().or(self.reported_time);
                }
            }
        }

        if backend.is_playing() {
            self.reported_time = Some(backend.seek(None));
        }

        PlaybackState {
            is_playing: backend.is_playing(),
            current_time: self.reported_time,
            duration: backend.duration().unwrap_or(0.0),
            loaded_ratio: backend.loaded_ratio(),
            ready: self.ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, ScoreError};
    use crate::models::EngineKind;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Debug, Default)]
    struct FakeState {
        ready: bool,
        ready_sent: bool,
        ended: bool,
        playing: bool,
        position: f64,
        calls: Vec<String>,
    }

    struct FakeBackend(Arc<Mutex<FakeState>>);

    impl PlaybackBackend for FakeBackend {
        fn play(&mut self) {
            let mut s = self.0.lock().unwrap();
            s.playing = true;
            s.calls.push("play".to_string());
        }
        fn pause(&mut self) {
            let mut s = self.0.lock().unwrap();
            s.playing = false;
            s.calls.push("pause".to_string());
        }
        fn seek(&mut self, target: Option<f64>) -> f64 {
            let mut s = self.0.lock().unwrap();
            if let Some(target) = target {
                s.position = target;
                s.calls.push(format!("seek {}", target));
            }
            s.position
        }
        fn duration(&self) -> Option<f64> {
            Some(100.0)
        }
        fn is_playing(&self) -> bool {
            self.0.lock().unwrap().playing
        }
        fn loaded_ratio(&self) -> f64 {
            1.0
        }
        fn poll(&mut self) -> Vec<BackendEvent> {
            let mut s = self.0.lock().unwrap();
            let mut events = Vec::new();
            if s.ready && !s.ready_sent {
                s.ready_sent = true;
                events.push(BackendEvent::Ready);
            }
            if s.ended {
                s.ended = false;
                s.playing = false;
                s.position = 100.0;
                events.push(BackendEvent::Ended);
            }
            events
        }
    }

    type States = Arc<Mutex<HashMap<String, Arc<Mutex<FakeState>>>>>;

    struct FakeFactory {
        states: States,
        /// Build time per track name, as for a download.
        delays: HashMap<String, Duration>,
    }

    impl BackendFactory for FakeFactory {
        fn create(&self, track: &Track) -> Result<Box<dyn PlaybackBackend>> {
            if let Some(delay) = self.delays.get(&track.name) {
                thread::sleep(*delay);
            }
            if track.src.is_empty() {
                return Err(ScoreError::Audio("no source".to_string()));
            }
            let state = Arc::new(Mutex::new(FakeState::default()));
            self.states
                .lock()
                .unwrap()
                .insert(track.name.clone(), state.clone());
            Ok(Box::new(FakeBackend(state)))
        }
    }

    fn tracks(names: &[&str]) -> Vec<Track> {
        names
            .iter()
            .map(|n| Track::audio(n, &format!("{}.ogg", n)))
            .collect()
    }

    fn slow_player(names: &[&str], delays: &[(&str, u64)]) -> (TrackPlayer, States) {
        let states: States = Arc::default();
        let mut player = TrackPlayer::new(Box::new(FakeFactory {
            states: states.clone(),
            delays: delays
                .iter()
                .map(|(name, ms)| (name.to_string(), Duration::from_millis(*ms)))
                .collect(),
        }));
        player.set_tracks(tracks(names));
        (player, states)
    }

    fn player(names: &[&str]) -> (TrackPlayer, States) {
        let (mut player, states) = slow_player(names, &[]);
        wait_engine(&mut player);
        (player, states)
    }

    /// Frames until the engine of the current selection is installed.
    fn wait_engine(player: &mut TrackPlayer) {
        for _ in 0..1000 {
            player.frame();
            if !player.is_loading() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("engine was never built");
    }

    fn state(states: &States, name: &str) -> Arc<Mutex<FakeState>> {
        states.lock().unwrap()[name].clone()
    }

    fn make_ready(player: &mut TrackPlayer, states: &States, name: &str) {
        state(states, name).lock().unwrap().ready = true;
        player.frame();
    }

    #[test]
    fn test_switch_carries_play_state_and_position() {
        let (mut player, states) = player(&["a", "b"]);
        make_ready(&mut player, &states, "a");
        player.play_pause();
        state(&states, "a").lock().unwrap().position = 42.0;
        player.frame();
        assert_eq!(player.reported_time(), Some(42.0));

        player.next_track();
        assert!(!state(&states, "a").lock().unwrap().playing);
        wait_engine(&mut player);
        // Nothing is applied before the new engine is ready
        assert!(state(&states, "b").lock().unwrap().calls.is_empty());

        make_ready(&mut player, &states, "b");
        let b = state(&states, "b");
        assert_eq!(b.lock().unwrap().calls, vec!["seek 42", "play"]);
        assert!(player.is_playing());
    }

    #[test]
    fn test_stale_engine_never_receives_carry_over() {
        let (mut player, states) = player(&["a", "b", "c"]);
        make_ready(&mut player, &states, "a");
        player.set_progress(10.0);

        player.select_track(1);
        // Switch again before "b" is ready
        player.select_track(2);
        wait_engine(&mut player);
        if let Some(b) = states.lock().unwrap().get("b") {
            b.lock().unwrap().ready = true;
        }
        player.frame();
        let b_calls = states
            .lock()
            .unwrap()
            .get("b")
            .map(|b| b.lock().unwrap().calls.clone());
        assert!(b_calls.unwrap_or_default().is_empty());

        make_ready(&mut player, &states, "c");
        assert_eq!(state(&states, "c").lock().unwrap().calls, vec!["seek 10"]);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_play_pause_restarts_at_end() {
        let (mut player, states) = player(&["a"]);
        make_ready(&mut player, &states, "a");
        player.play_pause();
        state(&states, "a").lock().unwrap().ended = true;
        let readout = player.frame();
        assert!(!readout.is_playing);
        assert_eq!(readout.current_time, Some(100.0));

        player.play_pause();
        let a = state(&states, "a");
        assert_eq!(a.lock().unwrap().position, 0.0);
        assert!(a.lock().unwrap().playing);
    }

    #[test]
    fn test_progress_is_clamped_and_stop_clears_time() {
        let (mut player, states) = player(&["a"]);
        make_ready(&mut player, &states, "a");

        player.set_progress(150.0);
        assert_eq!(player.reported_time(), Some(100.0));
        player.add_progress(-250.0);
        assert_eq!(player.reported_time(), Some(0.0));
        player.add_progress(2.0);
        assert_eq!(player.reported_time(), Some(2.0));
        player.set_progress_ratio(0.5);
        assert_eq!(player.reported_time(), Some(50.0));

        player.stop();
        assert_eq!(player.reported_time(), None);
        assert_eq!(state(&states, "a").lock().unwrap().position, 0.0);
    }

    #[test]
    fn test_next_track_cycles_and_unplayable_tracks_are_skipped_quietly() {
        let (mut player, _states) = player(&["a", "b"]);
        player.next_track();
        assert_eq!(player.selected(), Some(1));
        player.next_track();
        assert_eq!(player.selected(), Some(0));

        let mut broken = TrackPlayer::new(Box::new(FakeFactory {
            states: Arc::default(),
            delays: HashMap::new(),
        }));
        broken.set_tracks(vec![Track {
            name: "x".to_string(),
            src: String::new(),
            engine: EngineKind::Audio,
            soundfont: None,
        }]);
        wait_engine(&mut broken);
        broken.play_pause();
        assert_eq!(broken.frame(), PlaybackState::default());
    }

    #[test]
    fn test_select_track_returns_before_engine_is_built() {
        let started = Instant::now();
        let (mut player, states) = slow_player(&["a", "b"], &[("a", 300), ("b", 300)]);
        player.select_track(1);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(player.is_loading());
        assert_eq!(player.frame(), PlaybackState::default());

        // Commands given meanwhile are applied once the engine is ready
        player.set_progress(12.0);
        player.play_pause();

        wait_engine(&mut player);
        assert!(started.elapsed() >= Duration::from_millis(300));
        make_ready(&mut player, &states, "b");
        assert_eq!(state(&states, "b").lock().unwrap().calls, vec!["seek 12", "play"]);
        assert!(player.is_playing());
    }

    #[test]
    fn test_engine_built_for_an_old_selection_is_dropped() {
        let (mut player, states) = slow_player(&["a", "b", "c"], &[("b", 200)]);
        wait_engine(&mut player);
        player.select_track(1);
        player.select_track(2);
        wait_engine(&mut player);
        make_ready(&mut player, &states, "c");

        // "b" arrives after "c" was installed
        thread::sleep(Duration::from_millis(300));
        player.frame();
        assert!(state(&states, "b").lock().unwrap().calls.is_empty());

        player.play_pause();
        assert!(state(&states, "c").lock().unwrap().playing);
        assert!(!state(&states, "b").lock().unwrap().playing);
        assert_eq!(player.selected(), Some(2));
    }
}
