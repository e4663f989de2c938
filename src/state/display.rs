//! The score display: one score, its tracks and its viewport, advanced once
//! per frame on the frame thread.

use crate::config::DisplayConfig;
use crate::host::{DeferredScan, HostSurface};
use crate::input::KeyBindings;
use crate::input::events::DisplayAction;
use crate::loader::{LoaderUpdate, ScoreLoader};
use crate::logic::backend::BackendFactory;
use crate::logic::player::TrackPlayer;
use crate::logic::sync::TimeSync;
use crate::logic::viewport::ScrollController;
use crate::models::{ArtifactLink, PlaybackState, ScoreSource};
use crate::shared::snapshot::DisplaySnapshot;
use crate::state::traits::{HandleAction, Snapshot};
use crate::system::bus::{HostEvent, SystemBus, SystemEvent};

pub struct ScoreDisplay {
    bus: SystemBus,
    loader: ScoreLoader,
    player: TrackPlayer,
    sync: TimeSync,
    scroll: ScrollController,
    bindings: KeyBindings,
    scan: DeferredScan,
    surface: Box<dyn HostSurface>,
    focused: bool,
    links: Vec<ArtifactLink>,
    playback: PlaybackState,
}

impl ScoreDisplay {
    pub fn new(
        bus: SystemBus,
        config: &DisplayConfig,
        loader: ScoreLoader,
        backends: Box<dyn BackendFactory>,
        surface: Box<dyn HostSurface>,
    ) -> Self {
        log::info!("DISPLAY: Initializing score display");
        Self {
            bus,
            loader,
            player: TrackPlayer::new(backends),
            sync: TimeSync::new(),
            scroll: ScrollController::new(config.viewport.clone()),
            bindings: KeyBindings::new(config.playback.seek_step_secs),
            scan: DeferredScan::new(),
            surface,
            focused: false,
            links: Vec::new(),
            playback: PlaybackState::default(),
        }
    }

    pub fn player(&self) -> &TrackPlayer {
        &self.player
    }

    pub fn loader(&self) -> &ScoreLoader {
        &self.loader
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Runs one frame. Returns `false` once the host asked to quit.
    pub fn frame(&mut self) -> bool {
        while let Ok(event) = self.bus.sys_rx.try_recv() {
            if !self.handle_system(event) {
                return false;
            }
        }

        while let Ok(input) = self.bus.raw_input_rx.try_recv() {
            if let Some(action) = self.bindings.resolve(&input, self.focused) {
                self.handle_action(&action);
            }
        }
        while let Ok(action) = self.bus.action_rx.try_recv() {
            self.handle_action(&action);
        }

        if let Some(manifest) = self.scan.poll(self.surface.as_mut()) {
            self.links = manifest.links;
            self.player.set_tracks(manifest.tracks);
        }

        for update in self.loader.poll() {
            match update {
                LoaderUpdate::PositionsLoaded => self.sync.reset(),
                LoaderUpdate::ScoreVisible => self.bus.notify(HostEvent::ScoreVisible),
                LoaderUpdate::Errored => self.bus.notify(HostEvent::Errored),
                LoaderUpdate::PageFailed { index, attempts } => {
                    log::debug!("DISPLAY: Page {} failed {} times", index + 1, attempts);
                }
                LoaderUpdate::MetaLoaded { .. } | LoaderUpdate::PageLoaded { .. } => {}
            }
        }

        let playback = self.player.frame();
        if playback.current_time != self.playback.current_time {
            self.bus.notify(HostEvent::TimeChange {
                time: playback.current_time,
            });
        }
        self.playback = playback;

        if self.sync.update(self.loader.positions(), self.playback.current_time) {
            self.bus.notify(HostEvent::Highlight {
                element_id: self.sync.active_element().map(str::to_string),
            });
            self.follow_highlight();
        }

        true
    }

    fn handle_system(&mut self, event: SystemEvent) -> bool {
        match event {
            SystemEvent::Resize { width, height } => {
                self.scroll.resize(width, height);
                self.follow_highlight();
            }
            SystemEvent::WindowHeight { height } => {
                self.scroll.set_window_height(height);
                self.follow_highlight();
            }
            SystemEvent::FocusGained => self.focused = true,
            SystemEvent::FocusLost => self.focused = false,
            SystemEvent::SetSource(source) => self.set_source(source),
            SystemEvent::Quit => {
                log::info!("DISPLAY: Quit requested");
                self.player.pause();
                return false;
            }
        }
        true
    }

    /// Starts a new generation unless `source` names the current score.
    pub fn set_source(&mut self, source: ScoreSource) {
        if self.loader.set_source(source).is_none() {
            return;
        }
        let had_highlight = self.sync.active_element().is_some();
        self.sync.reset();
        self.scroll.set_scroll_left(0.0);
        if had_highlight {
            self.bus.notify(HostEvent::Highlight { element_id: None });
        }
    }

    /// Seeks to the occurrence of `element_id` closest to the playhead.
    pub fn select_element(&mut self, element_id: &str) {
        let current = self.player.reported_time().unwrap_or(0.0);
        match TimeSync::seek_target(self.loader.positions(), element_id, current) {
            Some(time) => {
                log::info!("SYNC: Element {} -> {:.3}s", element_id, time);
                self.player.set_progress(time);
            }
            None => log::debug!("SYNC: Element {} has no events", element_id),
        }
    }

    /// Scrolls the highlighted element's page into view when needed.
    fn follow_highlight(&mut self) {
        let Some(page) = self
            .sync
            .active_element()
            .and_then(|id| self.loader.positions().element(id))
            .map(|element| element.page)
        else {
            return;
        };
        let Some(meta) = self.loader.meta() else {
            return;
        };

        let layout = self.scroll.layout(meta.page_format, meta.pages);
        if let Some(left) = self.scroll.follow(&layout, page) {
            self.bus.notify(HostEvent::ScrollTo { left });
        }
    }
}

impl HandleAction for ScoreDisplay {
    fn handle_action(&mut self, action: &DisplayAction) {
        log::debug!("DISPLAY: {:?}", action);
        match action {
            DisplayAction::TogglePlay => self.player.play_pause(),
            DisplayAction::Stop => self.player.stop(),
            DisplayAction::SeekBy(delta) => self.player.add_progress(*delta),
            DisplayAction::SeekTo(time) => self.player.set_progress(*time),
            DisplayAction::SeekRatio(ratio) => self.player.set_progress_ratio(*ratio),
            DisplayAction::NextTrack => self.player.next_track(),
            DisplayAction::SelectTrack(index) => self.player.select_track(*index),
            DisplayAction::ToggleAutoScroll => {
                if self.scroll.toggle_auto_scroll() {
                    self.follow_highlight();
                }
            }
            DisplayAction::ToggleZoom => {
                self.scroll.toggle_zoom();
                self.follow_highlight();
            }
            DisplayAction::Scrolled(left) => self.scroll.set_scroll_left(*left),
            DisplayAction::ClickElement(id) => self.select_element(id),
            DisplayAction::ClickPage { page, x, y } => {
                let hit = self
                    .loader
                    .positions()
                    .element_at(*page, *x, *y)
                    .map(|element| element.id.clone());
                if let Some(id) = hit {
                    self.select_element(&id);
                }
            }
        }
    }
}

impl Snapshot for ScoreDisplay {
    type Output = DisplaySnapshot;

    fn create_snapshot(&self) -> DisplaySnapshot {
        let positions = self.loader.positions();
        DisplaySnapshot {
            source: self.loader.source().cloned(),
            pages: self.loader.pages().to_vec(),
            layout: self
                .loader
                .meta()
                .map(|meta| self.scroll.layout(meta.page_format, meta.pages)),
            errored: self.loader.is_errored(),
            playback: self.playback,
            highlight: self
                .sync
                .active_element()
                .and_then(|id| positions.element(id))
                .cloned(),
            tracks: self
                .player
                .tracks()
                .iter()
                .map(|track| track.name.clone())
                .collect(),
            selected_track: self.player.selected(),
            links: self.links.clone(),
            auto_scroll: self.scroll.auto_scroll(),
            zoomed: self.scroll.is_zoomed(),
            scroll_left: self.scroll.scroll_left(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoaderConfig, PositionConfig};
    use crate::error::Result;
    use crate::host::StaticHostSurface;
    use crate::input::events::{Key, KeyInput, Modifiers};
    use crate::loader::{LoadFuture, RepositoryFactory, ScoreRepository};
    use crate::logic::backend::{BackendEvent, PlaybackBackend};
    use crate::models::Track;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::runtime::Handle;

    // Element 1 on page 0 at 0 s and 6 s, element 2 on page 5 at 4 s
    const MPOS: &str = r#"<score>
        <elements>
          <element id="1" x="0" y="0" sx="120" sy="120" page="0"/>
          <element id="2" x="0" y="0" sx="120" sy="120" page="5"/>
        </elements>
        <events>
          <event elid="1" position="0"/>
          <event elid="2" position="4000"/>
          <event elid="1" position="6000"/>
        </events>
      </score>"#;

    struct FakeRepository;

    impl ScoreRepository for FakeRepository {
        fn meta(&self) -> LoadFuture<String> {
            Box::pin(async { Ok(r#"{"pages": 6}"#.to_string()) })
        }

        fn positions(&self) -> LoadFuture<String> {
            Box::pin(async { Ok(MPOS.to_string()) })
        }

        fn page(&self, index: usize) -> LoadFuture<Vec<u8>> {
            Box::pin(async move { Ok(format!("<svg id=\"{}\"/>", index).into_bytes()) })
        }
    }

    struct FakeRepositories;

    impl RepositoryFactory for FakeRepositories {
        fn open(&self, _source: &ScoreSource) -> Arc<dyn ScoreRepository> {
            Arc::new(FakeRepository)
        }
    }

    /// Ready at once; its clock only moves when a test moves it.
    struct FakeBackend {
        clock: Arc<Mutex<f64>>,
        playing: bool,
        ready_sent: bool,
    }

    impl PlaybackBackend for FakeBackend {
        fn play(&mut self) {
            self.playing = true;
        }
        fn pause(&mut self) {
            self.playing = false;
        }
        fn seek(&mut self, target: Option<f64>) -> f64 {
            let mut clock = self.clock.lock().unwrap();
            if let Some(target) = target {
                *clock = target;
            }
            *clock
        }
        fn duration(&self) -> Option<f64> {
            Some(10.0)
        }
        fn is_playing(&self) -> bool {
            self.playing
        }
        fn loaded_ratio(&self) -> f64 {
            1.0
        }
        fn poll(&mut self) -> Vec<BackendEvent> {
            if self.ready_sent {
                return Vec::new();
            }
            self.ready_sent = true;
            vec![BackendEvent::Ready]
        }
    }

    struct FakeBackends {
        clock: Arc<Mutex<f64>>,
    }

    impl BackendFactory for FakeBackends {
        fn create(&self, _track: &Track) -> Result<Box<dyn PlaybackBackend>> {
            Ok(Box::new(FakeBackend {
                clock: self.clock.clone(),
                playing: false,
                ready_sent: false,
            }))
        }
    }

    fn display() -> (ScoreDisplay, SystemBus, Arc<Mutex<f64>>) {
        let bus = SystemBus::new();
        let clock = Arc::new(Mutex::new(0.0));
        let config = DisplayConfig::default();
        let loader = ScoreLoader::new(
            Handle::current(),
            Arc::new(FakeRepositories),
            LoaderConfig::default(),
            PositionConfig::default(),
        );
        let display = ScoreDisplay::new(
            bus.clone(),
            &config,
            loader,
            Box::new(FakeBackends {
                clock: clock.clone(),
            }),
            Box::new(StaticHostSurface::new(r#"<track name="Audio" src="a.ogg"/>"#)),
        );
        (display, bus, clock)
    }

    fn drain(bus: &SystemBus) -> Vec<HostEvent> {
        bus.host_rx.try_iter().collect()
    }

    /// Runs frames until every page is in, collecting host events.
    async fn load(display: &mut ScoreDisplay, bus: &SystemBus) -> Vec<HostEvent> {
        bus.sys_tx
            .send(SystemEvent::SetSource(ScoreSource::directory("score")))
            .unwrap();
        let mut events = Vec::new();
        for _ in 0..500 {
            assert!(display.frame());
            events.extend(drain(bus));
            let pages = display.loader().pages();
            let visible = !pages.is_empty() && pages.iter().all(|p| p.is_loaded());
            let engine = display.player().selected().is_some() && !display.player().is_loading();
            if visible && engine && !display.loader().positions().is_empty() {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("score never loaded: {:?}", events);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_highlight_follows_playback_and_scrolls() {
        let (mut display, bus, clock) = display();
        bus.sys_tx
            .send(SystemEvent::Resize {
                width: 800.0,
                height: 1000.0,
            })
            .unwrap();

        let events = load(&mut display, &bus).await;
        assert_eq!(
            events.iter().filter(|e| **e == HostEvent::ScoreVisible).count(),
            1
        );
        assert_eq!(display.player().tracks().len(), 1);

        bus.action_tx.send(DisplayAction::TogglePlay).unwrap();
        display.frame();
        assert!(
            drain(&bus).contains(&HostEvent::Highlight {
                element_id: Some("1".to_string())
            })
        );

        *clock.lock().unwrap() = 4.5;
        display.frame();
        let events = drain(&bus);
        assert!(events.contains(&HostEvent::TimeChange { time: Some(4.5) }));
        assert!(events.contains(&HostEvent::Highlight {
            element_id: Some("2".to_string())
        }));
        assert!(events.iter().any(|e| matches!(e, HostEvent::ScrollTo { left } if *left > 0.0)));

        let snapshot = display.create_snapshot();
        assert_eq!(snapshot.highlight.as_ref().map(|e| e.page), Some(5));
        assert_eq!(snapshot.loaded_pages(), 6);
        assert!(snapshot.playback.is_playing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_keys_need_focus_and_no_modifiers() {
        let (mut display, bus, _clock) = display();
        load(&mut display, &bus).await;

        bus.raw_input_tx.send(KeyInput::plain(Key::Space)).unwrap();
        display.frame();
        assert!(!display.player().is_playing());

        bus.sys_tx.send(SystemEvent::FocusGained).unwrap();
        bus.raw_input_tx
            .send(KeyInput {
                key: Key::Space,
                modifiers: Modifiers {
                    ctrl: true,
                    ..Modifiers::default()
                },
            })
            .unwrap();
        display.frame();
        assert!(!display.player().is_playing());

        bus.raw_input_tx.send(KeyInput::plain(Key::Space)).unwrap();
        display.frame();
        assert!(display.player().is_playing());

        bus.raw_input_tx.send(KeyInput::plain(Key::Char('s'))).unwrap();
        display.frame();
        assert!(!display.create_snapshot().auto_scroll);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_click_seeks_to_nearest_occurrence() {
        let (mut display, bus, clock) = display();
        load(&mut display, &bus).await;

        display.handle_action(&DisplayAction::SeekTo(5.0));
        display.handle_action(&DisplayAction::ClickElement("1".to_string()));
        assert_eq!(*clock.lock().unwrap(), 6.0);

        display.handle_action(&DisplayAction::SeekTo(1.0));
        display.handle_action(&DisplayAction::ClickPage {
            page: 0,
            x: 10.0,
            y: 5.0,
        });
        assert_eq!(*clock.lock().unwrap(), 0.0);

        // Nothing at this point
        display.handle_action(&DisplayAction::ClickPage {
            page: 3,
            x: 10.0,
            y: 10.0,
        });
        assert_eq!(*clock.lock().unwrap(), 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_quit_ends_the_frame_loop() {
        let (mut display, bus, _clock) = display();
        assert!(display.frame());
        bus.sys_tx.send(SystemEvent::Quit).unwrap();
        assert!(!display.frame());
    }
}
