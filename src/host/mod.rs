//! Host embedding surface.
//!
//! The host declares tracks and download links as child markup:
//!
//! ```xml
//! <track name="Piano" src="audio.ogg"/>
//! <track name="MIDI" src="score.mid" type="midi" soundfont="piano.sf2"/>
//! <a href="score.mscz">Download score</a>
//! ```
//!
//! The markup may be attached after the display mounts, so it is scanned once
//! by a deferred scan that retries every frame until it is available.

use crate::error::{Result, ScoreError};
use crate::models::{ArtifactLink, EngineKind, Track};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostManifest {
    pub tracks: Vec<Track>,
    pub links: Vec<ArtifactLink>,
}

/// Where the host's child markup comes from.
pub trait HostSurface: Send {
    /// The markup once attached, `None` while it is not there yet.
    fn children(&mut self) -> Option<String>;
}

/// Markup known up front.
pub struct StaticHostSurface {
    markup: Option<String>,
}

impl StaticHostSurface {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: Some(markup.into()),
        }
    }

    /// A host without child markup.
    pub fn empty() -> Self {
        Self { markup: None }
    }
}

impl HostSurface for StaticHostSurface {
    fn children(&mut self) -> Option<String> {
        self.markup.clone()
    }
}

/// Markup read from a manifest file; available once the file exists.
pub struct FileHostSurface {
    path: PathBuf,
}

impl FileHostSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HostSurface for FileHostSurface {
    fn children(&mut self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(markup) => Some(markup),
            Err(e) => {
                log::trace!("HOST: {} not available yet: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// Runs the manifest scan exactly once, on the first frame the markup exists.
#[derive(Debug, Default)]
pub struct DeferredScan {
    done: bool,
}

impl DeferredScan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn poll(&mut self, surface: &mut dyn HostSurface) -> Option<HostManifest> {
        if self.done {
            return None;
        }
        let markup = surface.children()?;
        self.done = true;

        match parse_manifest(&markup) {
            Ok(manifest) => {
                log::info!(
                    "HOST: {} tracks, {} links",
                    manifest.tracks.len(),
                    manifest.links.len()
                );
                Some(manifest)
            }
            Err(e) => {
                log::error!("HOST: Invalid child markup: {}", e);
                Some(HostManifest::default())
            }
        }
    }
}

fn attributes(e: &BytesStart) -> HashMap<String, String> {
    e.attributes()
        .filter_map(|attr| attr.ok())
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

fn parse_track(attrs: &HashMap<String, String>) -> Option<Track> {
    let Some(src) = attrs.get("src").filter(|s| !s.is_empty()) else {
        log::warn!("HOST: Skipping <track> without src");
        return None;
    };
    let engine = match attrs.get("type").map_or("", String::as_str).parse::<EngineKind>() {
        Ok(engine) => engine,
        Err(e) => {
            log::warn!("HOST: Skipping track {}: {}", src, e);
            return None;
        }
    };

    Some(Track {
        name: attrs.get("name").cloned().unwrap_or_else(|| src.clone()),
        src: src.clone(),
        engine,
        soundfont: attrs.get("soundfont").cloned(),
    })
}

/// Parses the host's child markup. Unknown elements are ignored; the markup
/// may have several top-level elements.
pub fn parse_manifest(markup: &str) -> Result<HostManifest> {
    // Wrap so a bare child list is a well-formed document
    let wrapped = format!("<children>{}</children>", markup);
    let mut reader = Reader::from_str(&wrapped);
    reader.trim_text(true);

    let mut manifest = HostManifest::default();
    let mut open_link: Option<ArtifactLink> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"track" => {
                if let Some(track) = parse_track(&attributes(&e)) {
                    manifest.tracks.push(track);
                }
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"a" => {
                let attrs = attributes(&e);
                open_link = attrs.get("href").map(|href| ArtifactLink {
                    label: String::new(),
                    href: href.clone(),
                });
            }
            Ok(Event::Text(text)) => {
                if let Some(link) = open_link.as_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| ScoreError::Config(e.to_string()))?;
                    link.label.push_str(&text);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"a" => {
                if let Some(mut link) = open_link.take() {
                    if link.label.is_empty() {
                        link.label = link.href.clone();
                    }
                    manifest.links.push(link);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ScoreError::Config(format!(
                    "host markup at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKUP: &str = r#"
        <track name="Piano" src="audio.ogg"/>
        <track name="Theremin" src="t.wav" type="theremin"/>
        <track src="score.mid" type="midi" soundfont="piano.sf2"></track>
        <track name="No source"/>
        <a href="score.mscz">Download &amp; edit</a>
        <a href="score.pdf"></a>
        <p>ignored</p>
    "#;

    #[test]
    fn test_manifest_skips_unknown_engines() {
        let manifest = parse_manifest(MARKUP).unwrap();

        assert_eq!(manifest.tracks.len(), 2);
        assert_eq!(manifest.tracks[0], Track::audio("Piano", "audio.ogg"));
        assert_eq!(manifest.tracks[1].engine, EngineKind::Midi);
        assert_eq!(manifest.tracks[1].name, "score.mid");
        assert_eq!(manifest.tracks[1].soundfont.as_deref(), Some("piano.sf2"));

        assert_eq!(
            manifest.links,
            vec![
                ArtifactLink {
                    label: "Download & edit".to_string(),
                    href: "score.mscz".to_string(),
                },
                ArtifactLink {
                    label: "score.pdf".to_string(),
                    href: "score.pdf".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_markup_is_an_error() {
        assert!(parse_manifest("<track src='a.ogg'></wrong>").is_err());
    }

    /// Becomes available on the third frame.
    struct LateSurface {
        frames: usize,
    }

    impl HostSurface for LateSurface {
        fn children(&mut self) -> Option<String> {
            self.frames += 1;
            (self.frames >= 3).then(|| r#"<track src="a.ogg"/>"#.to_string())
        }
    }

    #[test]
    fn test_deferred_scan_runs_once_when_markup_appears() {
        let mut surface = LateSurface { frames: 0 };
        let mut scan = DeferredScan::new();

        assert_eq!(scan.poll(&mut surface), None);
        assert_eq!(scan.poll(&mut surface), None);
        let manifest = scan.poll(&mut surface).unwrap();
        assert_eq!(manifest.tracks.len(), 1);
        assert!(scan.is_done());
        assert_eq!(scan.poll(&mut surface), None);
        assert_eq!(surface.frames, 3);
    }

    #[test]
    fn test_file_surface_waits_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.xml");
        let mut surface = FileHostSurface::new(&path);
        assert_eq!(surface.children(), None);

        std::fs::write(&path, "<a href=\"x\">X</a>").unwrap();
        assert_eq!(surface.children().as_deref(), Some("<a href=\"x\">X</a>"));
    }
}
