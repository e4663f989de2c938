//! Score identity and metadata.

use crate::error::{Result, ScoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How the score artifacts are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    /// A single score file handed to a conversion session.
    DirectFileConversion,
    /// A `.wd` directory with `meta.metajson`, `graphic-<n>.svg` and `measures.mpos`.
    PreRenderedDirectory,
}

/// Where a score (or one of its artifacts) lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Path(PathBuf),
    Url(String),
}

impl Locator {
    /// Interprets `http://` and `https://` prefixes as URLs, anything else as a path.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Locator::Url(raw.trim_end_matches('/').to_string())
        } else {
            Locator::Path(PathBuf::from(raw))
        }
    }

    /// Resolves a file name relative to this locator (a directory).
    pub fn join(&self, name: &str) -> Locator {
        match self {
            Locator::Path(base) => Locator::Path(base.join(name)),
            Locator::Url(base) => Locator::Url(format!("{}/{}", base, name)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Path(path) => write!(f, "{}", path.display()),
            Locator::Url(url) => write!(f, "{}", url),
        }
    }
}

/// One score instance. Replaced, never mutated, when the host assigns a new locator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSource {
    pub source_type: SourceType,
    pub locator: Locator,
    /// Known once the metadata of the generation has been committed.
    pub page_count: Option<usize>,
}

impl ScoreSource {
    pub fn directory(locator: &str) -> Self {
        Self {
            source_type: SourceType::PreRenderedDirectory,
            locator: Locator::parse(locator),
            page_count: None,
        }
    }

    pub fn file(locator: &str) -> Self {
        Self {
            source_type: SourceType::DirectFileConversion,
            locator: Locator::parse(locator),
            page_count: None,
        }
    }

    /// Two sources describe the same score when type and locator match.
    pub fn same_score(&self, other: &ScoreSource) -> bool {
        self.source_type == other.source_type && self.locator == other.locator
    }
}

/// Page dimensions in the units of the page graphic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PageFormat {
    pub width: f64,
    pub height: f64,
}

impl PageFormat {
    pub fn aspect(&self) -> f64 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

impl Default for PageFormat {
    fn default() -> Self {
        // A4 in MuseScore's default units
        Self {
            width: 210.0,
            height: 297.0,
        }
    }
}

/// Decoded `meta.metajson`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreMeta {
    pub pages: usize,
    #[serde(default)]
    pub page_format: PageFormat,
    /// Score duration in seconds, when the exporter provides it.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ScoreMeta {
    /// Parses the metadata document.
    ///
    /// MuseScore 4 nests the fields under `metadata`; that wrapper is unwrapped
    /// when no top-level `pages` key exists. A score without pages is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ScoreError::Meta(e.to_string()))?;

        let inner = match value.get("pages") {
            Some(_) => value,
            None => match value.get("metadata") {
                Some(metadata) => metadata.clone(),
                None => value,
            },
        };

        let meta: Self =
            serde_json::from_value(inner).map_err(|e| ScoreError::Meta(e.to_string()))?;
        if meta.pages == 0 {
            return Err(ScoreError::Meta("score has no pages".to_string()));
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_meta() {
        let meta = ScoreMeta::parse(
            r#"{"pages": 3, "pageFormat": {"width": 210, "height": 297}, "duration": 95}"#,
        )
        .unwrap();
        assert_eq!(meta.pages, 3);
        assert_eq!(meta.page_format.width, 210.0);
        assert_eq!(meta.duration, Some(95.0));
    }

    #[test]
    fn test_parse_wrapped_meta() {
        let meta = ScoreMeta::parse(r#"{"metadata": {"pages": 2, "title": "Etude"}}"#).unwrap();
        assert_eq!(meta.pages, 2);
        assert_eq!(meta.title.as_deref(), Some("Etude"));
        assert_eq!(meta.page_format, PageFormat::default());
    }

    #[test]
    fn test_parse_rejects_missing_pages() {
        assert!(matches!(
            ScoreMeta::parse(r#"{"title": "x"}"#),
            Err(ScoreError::Meta(_))
        ));
        assert!(ScoreMeta::parse("not json").is_err());
    }

    #[test]
    fn test_parse_rejects_zero_pages() {
        assert!(matches!(
            ScoreMeta::parse(r#"{"pages": 0}"#),
            Err(ScoreError::Meta(_))
        ));
        assert!(ScoreMeta::parse(r#"{"metadata": {"pages": 0}}"#).is_err());
    }

    #[test]
    fn test_locator_join() {
        let url = Locator::parse("https://example.org/scores/a.wd/");
        assert_eq!(
            url.join("meta.metajson"),
            Locator::Url("https://example.org/scores/a.wd/meta.metajson".to_string())
        );

        let path = Locator::parse("data/a.wd");
        assert_eq!(
            path.join("graphic-1.svg"),
            Locator::Path(PathBuf::from("data/a.wd/graphic-1.svg"))
        );
    }
}
