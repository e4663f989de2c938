//! Per-frame playback readout.

/// Derived every frame by polling the backend; never stored as a source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Last reported time, `None` while stopped or without a backend.
    pub current_time: Option<f64>,
    pub duration: f64,
    /// Share of the track the engine has buffered or synthesized.
    pub loaded_ratio: f64,
    pub ready: bool,
}

impl PlaybackState {
    /// Position as a share of the duration, 0 when the duration is unknown.
    pub fn progress_ratio(&self) -> f64 {
        match self.current_time {
            Some(time) if self.duration > 0.0 => (time / self.duration).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_ratio() {
        let mut state = PlaybackState {
            current_time: Some(30.0),
            duration: 120.0,
            ..Default::default()
        };
        assert_eq!(state.progress_ratio(), 0.25);

        state.duration = 0.0;
        assert_eq!(state.progress_ratio(), 0.0);
    }
}
