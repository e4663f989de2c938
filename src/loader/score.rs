//! Generation orchestration for one score display.
//!
//! Async fetches run as tokio tasks and report back over a channel. Everything
//! they produce is committed in [`ScoreLoader::poll`], the single commit point,
//! and only if the task's token is still the current one.

use super::pages::{Completion, PageScheduler};
use super::source::{RepositoryFactory, ScoreRepository};
use super::token::{Generation, LoadToken};
use crate::config::{LoaderConfig, PositionConfig};
use crate::error::Result;
use crate::models::{PageAsset, PageGraphic, PositionIndex, ScoreMeta, ScoreSource};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Completions sent back by load tasks.
#[derive(Debug)]
enum LoadEvent {
    Meta {
        token: LoadToken,
        result: Result<String>,
    },
    Positions {
        token: LoadToken,
        result: Result<String>,
    },
    Page {
        token: LoadToken,
        index: usize,
        result: Result<Vec<u8>>,
    },
    RetryReady {
        token: LoadToken,
        index: usize,
    },
}

/// Visible state changes reported by [`ScoreLoader::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderUpdate {
    MetaLoaded { pages: usize },
    PositionsLoaded,
    PageLoaded { index: usize },
    PageFailed { index: usize, attempts: u32 },
    /// Metadata failed; the generation shows an error and is not retried.
    Errored,
    /// Every page of the generation is loaded. Fired once per generation.
    ScoreVisible,
}

pub struct ScoreLoader {
    runtime: Handle,
    factory: Arc<dyn RepositoryFactory>,
    config: LoaderConfig,
    positions_config: PositionConfig,

    generation: Generation,
    source: Option<ScoreSource>,
    repository: Option<Arc<dyn ScoreRepository>>,

    meta: Option<ScoreMeta>,
    errored: bool,
    scheduler: Option<PageScheduler>,
    positions: PositionIndex,
    visible_notified: bool,

    tx: Sender<LoadEvent>,
    rx: Receiver<LoadEvent>,
}

impl ScoreLoader {
    pub fn new(
        runtime: Handle,
        factory: Arc<dyn RepositoryFactory>,
        config: LoaderConfig,
        positions_config: PositionConfig,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            runtime,
            factory,
            config,
            positions_config,
            generation: Generation::new(),
            source: None,
            repository: None,
            meta: None,
            errored: false,
            scheduler: None,
            positions: PositionIndex::empty(),
            visible_notified: false,
            tx,
            rx,
        }
    }

    /// Installs a new score source and starts its generation.
    ///
    /// Returns `None` when the source designates the score already shown.
    pub fn set_source(&mut self, source: ScoreSource) -> Option<LoadToken> {
        if let Some(current) = &self.source {
            if current.same_score(&source) {
                return None;
            }
        }

        let token = self.generation.advance();
        log::info!("LOADER: Generation {} for {}", token, source.locator);

        // Clear visible state; stale tasks keep running but cannot commit
        self.meta = None;
        self.errored = false;
        self.scheduler = None;
        self.positions = PositionIndex::empty();
        self.visible_notified = false;

        let repository = self.factory.open(&source);
        self.source = Some(source);
        self.repository = Some(repository.clone());

        let tx = self.tx.clone();
        let meta = repository.meta();
        self.runtime.spawn(async move {
            let result = meta.await;
            let _ = tx.send(LoadEvent::Meta { token, result });
        });

        let tx = self.tx.clone();
        let positions = repository.positions();
        self.runtime.spawn(async move {
            let result = positions.await;
            let _ = tx.send(LoadEvent::Positions { token, result });
        });

        Some(token)
    }

    /// Drains finished tasks, commits current-generation results and admits
    /// more pages. Called every frame.
    pub fn poll(&mut self) -> Vec<LoaderUpdate> {
        let mut updates = Vec::new();

        while let Ok(event) = self.rx.try_recv() {
            self.commit(event, &mut updates);
        }
        self.schedule_pages();

        updates
    }

    fn commit(&mut self, event: LoadEvent, updates: &mut Vec<LoaderUpdate>) {
        match event {
            LoadEvent::Meta { token, result } => {
                if !self.generation.is_current(token) {
                    log::debug!("LOADER: Dropping stale metadata of {}", token);
                    return;
                }
                match result.and_then(|text| ScoreMeta::parse(&text)) {
                    Ok(meta) => {
                        let pages = meta.pages;
                        log::info!("LOADER: Metadata loaded, {} pages", pages);
                        self.scheduler = Some(PageScheduler::new(
                            pages,
                            self.config.max_in_flight,
                            self.config.max_retries,
                        ));
                        if let Some(source) = self.source.as_mut() {
                            source.page_count = Some(pages);
                        }
                        self.meta = Some(meta);
                        updates.push(LoaderUpdate::MetaLoaded { pages });
                        self.check_visible(updates);
                    }
                    Err(e) => {
                        log::warn!("LOADER: Metadata load failed: {}", e);
                        self.errored = true;
                        updates.push(LoaderUpdate::Errored);
                    }
                }
            }
            LoadEvent::Positions { token, result } => {
                if !self.generation.is_current(token) {
                    log::debug!("LOADER: Dropping stale positions of {}", token);
                    return;
                }
                match result {
                    Ok(text) => {
                        self.positions = PositionIndex::parse(&text, &self.positions_config);
                        log::info!(
                            "LOADER: Positions loaded, {} events",
                            self.positions.events().len()
                        );
                        updates.push(LoaderUpdate::PositionsLoaded);
                    }
                    Err(e) => {
                        // Highlighting and auto-scroll stay off for this score
                        log::warn!("LOADER: Positions load failed: {}", e);
                    }
                }
            }
            LoadEvent::Page {
                token,
                index,
                result,
            } => {
                if !self.generation.is_current(token) {
                    log::debug!("LOADER: Dropping stale page {} of {}", index + 1, token);
                    return;
                }
                let Some(scheduler) = self.scheduler.as_mut() else {
                    return;
                };
                let result = result.map(PageGraphic::new);
                if let Err(e) = &result {
                    log::warn!("LOADER: Graphic load failed for page {}: {}", index + 1, e);
                }
                match scheduler.complete(index, result) {
                    Completion::Loaded => {
                        updates.push(LoaderUpdate::PageLoaded { index });
                        self.check_visible(updates);
                    }
                    Completion::RetryScheduled { attempts } => {
                        updates.push(LoaderUpdate::PageFailed { index, attempts });
                        self.schedule_retry(token, index);
                    }
                    Completion::GaveUp { attempts } => {
                        log::error!(
                            "LOADER: Giving up on page {} after {} attempts",
                            index + 1,
                            attempts
                        );
                        updates.push(LoaderUpdate::PageFailed { index, attempts });
                    }
                    Completion::Ignored => {}
                }
            }
            LoadEvent::RetryReady { token, index } => {
                if !self.generation.is_current(token) {
                    return;
                }
                if let Some(scheduler) = self.scheduler.as_mut() {
                    scheduler.retry_ready(index);
                }
            }
        }
    }

    fn check_visible(&mut self, updates: &mut Vec<LoaderUpdate>) {
        let all_loaded = self.scheduler.as_ref().is_some_and(|s| s.all_loaded());
        if all_loaded && !self.visible_notified {
            self.visible_notified = true;
            log::info!("LOADER: Score visible");
            updates.push(LoaderUpdate::ScoreVisible);
        }
    }

    fn schedule_pages(&mut self) {
        let (Some(scheduler), Some(repository), Some(token)) = (
            self.scheduler.as_mut(),
            self.repository.as_ref(),
            self.generation.current(),
        ) else {
            return;
        };

        for index in scheduler.admit() {
            let tx = self.tx.clone();
            let page = repository.page(index);
            self.runtime.spawn(async move {
                let result = page.await;
                let _ = tx.send(LoadEvent::Page {
                    token,
                    index,
                    result,
                });
            });
        }
    }

    fn schedule_retry(&self, token: LoadToken, index: usize) {
        let tx = self.tx.clone();
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LoadEvent::RetryReady { token, index });
        });
    }

    pub fn source(&self) -> Option<&ScoreSource> {
        self.source.as_ref()
    }

    pub fn token(&self) -> Option<LoadToken> {
        self.generation.current()
    }

    pub fn meta(&self) -> Option<&ScoreMeta> {
        self.meta.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.meta.is_some()
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    pub fn pages(&self) -> &[PageAsset] {
        self.scheduler.as_ref().map(|s| s.pages()).unwrap_or(&[])
    }

    pub fn positions(&self) -> &PositionIndex {
        &self.positions
    }
}
