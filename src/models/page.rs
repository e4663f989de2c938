//! Per-page graphic state.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::sync::Arc;

/// Content of one loaded page.
///
/// The bytes stay opaque to the core; only the SVG `viewBox` is read so the page
/// renderer can map element geometry onto the graphic.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGraphic {
    pub bytes: Arc<[u8]>,
    /// `[min_x, min_y, width, height]` of the SVG root, if any.
    pub view_box: Option<[f64; 4]>,
}

impl PageGraphic {
    pub fn new(bytes: Vec<u8>) -> Self {
        let view_box = svg_view_box(&bytes);
        Self {
            bytes: bytes.into(),
            view_box,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Load state of one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PageAsset {
    #[default]
    NotRequested,
    Loading,
    Loaded(PageGraphic),
    /// Waiting for the retry delay to elapse.
    Failed { attempts: u32 },
}

impl PageAsset {
    pub fn is_loading(&self) -> bool {
        matches!(self, PageAsset::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, PageAsset::Loaded(_))
    }

    pub fn graphic(&self) -> Option<&PageGraphic> {
        match self {
            PageAsset::Loaded(graphic) => Some(graphic),
            _ => None,
        }
    }
}

fn svg_view_box(bytes: &[u8]) -> Option<[f64; 4]> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut reader = Reader::from_str(text);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"svg" {
                    // The root element decides; anything else is not an SVG page
                    return None;
                }
                let attr = e
                    .attributes()
                    .filter_map(|a| a.ok())
                    .find(|a| a.key.as_ref() == b"viewBox")?;
                let value = attr.unescape_value().ok()?;
                let parts: Vec<f64> = value
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| s.parse().ok())
                    .collect();
                return match parts.as_slice() {
                    [x, y, w, h] => Some([*x, *y, *w, *h]),
                    _ => None,
                };
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_box_from_svg_root() {
        let svg = br#"<?xml version="1.0"?>
<!-- exported -->
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 2480 3508"><title>p</title></svg>"#;
        let graphic = PageGraphic::new(svg.to_vec());
        assert_eq!(graphic.view_box, Some([0.0, 0.0, 2480.0, 3508.0]));
    }

    #[test]
    fn test_non_svg_content_stays_opaque() {
        let graphic = PageGraphic::new(vec![0x89, b'P', b'N', b'G']);
        assert_eq!(graphic.view_box, None);
        assert_eq!(graphic.len(), 4);

        let graphic = PageGraphic::new(b"<html><svg viewBox=\"0 0 1 1\"/></html>".to_vec());
        assert_eq!(graphic.view_box, None);
    }
}
