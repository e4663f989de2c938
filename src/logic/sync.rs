//! Time-sync engine: playback time to score element, and back.

use crate::models::{PositionIndex, ScoreEvent};

/// Search hint into the event list, kept across frames.
///
/// Playback mostly moves forward by a few events per frame, so resolving from
/// the previous index is constant time in the common case.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HighlightCursor {
    index: usize,
}

impl HighlightCursor {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Index of the last event at or before `time`, walking from the hint.
    pub fn resolve(&mut self, events: &[ScoreEvent], time: Option<f64>) -> Option<usize> {
        let (Some(time), false) = (time, events.is_empty()) else {
            self.reset();
            return None;
        };

        let mut i = self.index.min(events.len() - 1);
        while i > 0 && events[i].time > time {
            i -= 1;
        }
        if events[i].time > time {
            // Before the first event
            self.reset();
            return None;
        }
        while i + 1 < events.len() && events[i + 1].time <= time {
            i += 1;
        }

        self.index = i;
        Some(i)
    }
}

/// Tracks the highlighted element of one score.
#[derive(Debug, Default)]
pub struct TimeSync {
    cursor: HighlightCursor,
    active: Option<String>,
}

impl TimeSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the cursor and the highlight, e.g. when the score changes.
    pub fn reset(&mut self) {
        self.cursor.reset();
        self.active = None;
    }

    pub fn cursor(&self) -> HighlightCursor {
        self.cursor
    }

    pub fn active_element(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Resolves the element playing at `time`. Returns `true` when the
    /// highlighted element changed.
    pub fn update(&mut self, index: &PositionIndex, time: Option<f64>) -> bool {
        let element = self
            .cursor
            .resolve(index.events(), time)
            .map(|i| &index.events()[i].element_id);

        if element.map(String::as_str) == self.active.as_deref() {
            return false;
        }
        log::trace!("SYNC: Highlight {:?} at {:?}", element, time);
        self.active = element.cloned();
        true
    }

    /// Timestamp of `element_id` closest to `current`; `None` when the element
    /// has no events.
    pub fn seek_target(index: &PositionIndex, element_id: &str, current: f64) -> Option<f64> {
        closest_time(&index.times_for_element(element_id), current)
    }
}

/// Closest of `times` (ascending) to `current`. Equal distances keep the
/// earlier time.
pub fn closest_time(times: &[f64], current: f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for &time in times {
        let distance = (time - current).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((time, distance)),
        }
    }
    best.map(|(time, _)| time)
}
