//! Level-triggered page scheduler.
//!
//! Pure state machine over the page array; the owner calls [`PageScheduler::admit`]
//! on every state change (and every frame), so a missed trigger never stalls
//! progress. I/O happens elsewhere.

use crate::error::ScoreError;
use crate::models::{PageAsset, PageGraphic};

/// What the owner has to do after a page finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Loaded,
    /// Call [`PageScheduler::retry_ready`] after the retry delay.
    RetryScheduled { attempts: u32 },
    /// `max_retries` reached, the page stays failed.
    GaveUp { attempts: u32 },
    /// The page was not loading (duplicate or reset); nothing changed.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct PageScheduler {
    pages: Vec<PageAsset>,
    max_in_flight: usize,
    max_retries: Option<u32>,
    /// Failed attempts per page, kept across retries.
    failures: Vec<u32>,
}

impl PageScheduler {
    pub fn new(page_count: usize, max_in_flight: usize, max_retries: Option<u32>) -> Self {
        Self {
            pages: vec![PageAsset::NotRequested; page_count],
            max_in_flight: max_in_flight.max(1),
            max_retries,
            failures: vec![0; page_count],
        }
    }

    pub fn pages(&self) -> &[PageAsset] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&PageAsset> {
        self.pages.get(index)
    }

    pub fn loading_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_loading()).count()
    }

    pub fn loaded_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_loaded()).count()
    }

    pub fn all_loaded(&self) -> bool {
        self.pages.iter().all(|p| p.is_loaded())
    }

    /// Moves the lowest-index `NotRequested` pages to `Loading` until the
    /// in-flight bound is reached. Returns the pages to fetch.
    pub fn admit(&mut self) -> Vec<usize> {
        let mut in_flight = self.loading_count();
        let mut admitted = Vec::new();

        for (index, page) in self.pages.iter_mut().enumerate() {
            if in_flight >= self.max_in_flight {
                break;
            }
            if matches!(page, PageAsset::NotRequested) {
                *page = PageAsset::Loading;
                in_flight += 1;
                admitted.push(index);
            }
        }

        admitted
    }

    pub fn complete(
        &mut self,
        index: usize,
        result: Result<PageGraphic, ScoreError>,
    ) -> Completion {
        let Some(page) = self.pages.get_mut(index) else {
            return Completion::Ignored;
        };
        if !page.is_loading() {
            return Completion::Ignored;
        }

        match result {
            Ok(graphic) => {
                *page = PageAsset::Loaded(graphic);
                Completion::Loaded
            }
            Err(_) => {
                self.failures[index] += 1;
                let attempts = self.failures[index];
                *page = PageAsset::Failed { attempts };
                match self.max_retries {
                    Some(max) if attempts > max => Completion::GaveUp { attempts },
                    _ => Completion::RetryScheduled { attempts },
                }
            }
        }
    }

    /// Failed → NotRequested once the retry delay elapsed.
    pub fn retry_ready(&mut self, index: usize) -> bool {
        match self.pages.get_mut(index) {
            Some(page @ PageAsset::Failed { .. }) => {
                *page = PageAsset::NotRequested;
                true
            }
            _ => false,
        }
    }

    pub fn attempts(&self, index: usize) -> u32 {
        self.failures.get(index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphic() -> PageGraphic {
        PageGraphic::new(b"<svg viewBox=\"0 0 10 10\"/>".to_vec())
    }

    fn failure() -> ScoreError {
        ScoreError::Http {
            url: "x".to_string(),
            message: "503".to_string(),
        }
    }

    #[test]
    fn test_admits_lowest_indices_up_to_bound() {
        let mut scheduler = PageScheduler::new(10, 3, None);
        assert_eq!(scheduler.admit(), vec![0, 1, 2]);
        assert_eq!(scheduler.loading_count(), 3);
        // Level-triggered: admitting again without a change is a no-op
        assert!(scheduler.admit().is_empty());

        assert_eq!(scheduler.complete(1, Ok(graphic())), Completion::Loaded);
        assert_eq!(scheduler.admit(), vec![3]);
    }

    #[test]
    fn test_never_more_than_bound_loading() {
        let mut scheduler = PageScheduler::new(10, 3, None);
        let mut step = 0;
        while !scheduler.all_loaded() {
            let admitted = scheduler.admit();
            assert!(scheduler.loading_count() <= 3);
            // Complete pages out of order
            let loading: Vec<usize> = (0..10)
                .filter(|&i| scheduler.page(i).unwrap().is_loading())
                .collect();
            let pick = loading[step % loading.len()];
            scheduler.complete(pick, Ok(graphic()));
            assert!(scheduler.loading_count() <= 3);
            step += 1;
            assert!(step < 100, "scheduler stalled, last admitted {:?}", admitted);
        }
        assert_eq!(scheduler.loaded_count(), 10);
    }

    #[test]
    fn test_failure_then_retry() {
        let mut scheduler = PageScheduler::new(2, 3, None);
        scheduler.admit();

        assert_eq!(
            scheduler.complete(0, Err(failure())),
            Completion::RetryScheduled { attempts: 1 }
        );
        assert_eq!(scheduler.page(0), Some(&PageAsset::Failed { attempts: 1 }));
        // Failed pages are not re-admitted until the delay elapsed
        assert!(scheduler.admit().is_empty());

        assert!(scheduler.retry_ready(0));
        assert_eq!(scheduler.admit(), vec![0]);
        assert_eq!(scheduler.complete(0, Ok(graphic())), Completion::Loaded);
    }

    #[test]
    fn test_bounded_retries_give_up() {
        let mut scheduler = PageScheduler::new(1, 3, Some(1));
        scheduler.admit();
        assert_eq!(
            scheduler.complete(0, Err(failure())),
            Completion::RetryScheduled { attempts: 1 }
        );
        scheduler.retry_ready(0);
        scheduler.admit();
        assert_eq!(
            scheduler.complete(0, Err(failure())),
            Completion::GaveUp { attempts: 2 }
        );
    }

    #[test]
    fn test_duplicate_completion_ignored() {
        let mut scheduler = PageScheduler::new(1, 3, None);
        assert_eq!(scheduler.complete(0, Ok(graphic())), Completion::Ignored);
        assert_eq!(scheduler.complete(5, Ok(graphic())), Completion::Ignored);
        assert!(!scheduler.retry_ready(0));
    }
}
