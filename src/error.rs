//! Error types shared by the loader, the playback backends and the host surface.
//!
//! Failures are contained at the component that detects them: a page failure is
//! retried by the scheduler, a positions failure degrades to "no highlighting", and
//! only a metadata failure marks the whole generation as errored.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    /// Local file access failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote fetch failed (non-2xx status, transport error or unreadable body).
    #[error("HTTP fetch of {url} failed: {message}")]
    Http { url: String, message: String },

    /// `meta.metajson` could not be decoded.
    #[error("Invalid score metadata: {0}")]
    Meta(String),

    /// The conversion collaborator could not produce an artifact.
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// The requested page does not exist in the current score.
    #[error("Page {index} out of range (score has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    /// An engine could not be created or driven.
    #[error("Audio engine error: {0}")]
    Audio(String),

    /// The host declared a track type no backend exists for.
    #[error("Unsupported engine type: {0}")]
    UnsupportedEngine(String),

    /// Malformed host manifest or configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The async task carrying a load was dropped before reporting back.
    #[error("Load task aborted: {0}")]
    Aborted(String),
}

impl ScoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_part() {
        let err = ScoreError::PageOutOfRange { index: 4, count: 3 };
        assert_eq!(err.to_string(), "Page 4 out of range (score has 3 pages)");

        let err = ScoreError::UnsupportedEngine("theremin".to_string());
        assert_eq!(err.to_string(), "Unsupported engine type: theremin");
    }
}
