//! Position index: event → time and element → geometry tables for one score.
//!
//! Two source shapes exist. MuseScore's `measures.mpos` export is a sparse XML
//! document; conversion sessions hand out a dense JSON document. Both are reduced
//! to [`RawElement`]/[`RawEvent`] records and normalized in one place, so scaling
//! and hit-box clamping happen exactly once and downstream code never re-derives
//! geometry.

use crate::config::PositionConfig;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;
use std::collections::HashMap;

/// A point in playback time at which an element becomes active.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEvent {
    pub element_id: String,
    /// Seconds from the start of the score.
    pub time: f64,
}

/// A clickable, highlightable area on one page, in page pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreElement {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// 0-based page index.
    pub page: usize,
}

impl ScoreElement {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// Element record before scaling, in exporter units.
#[derive(Debug, Clone)]
struct RawElement {
    id: String,
    x: f64,
    y: f64,
    sx: f64,
    sy: f64,
    page: usize,
}

/// Event record before conversion, position in milliseconds.
#[derive(Debug, Clone)]
struct RawEvent {
    element_id: String,
    position_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionIndex {
    /// Sorted ascending by time.
    events: Vec<ScoreEvent>,
    elements: HashMap<String, ScoreElement>,
}

impl PositionIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the index from the XML `measures.mpos` shape.
    ///
    /// Records with missing or unparsable attributes are skipped. A malformed
    /// document keeps whatever was read before the error.
    pub fn from_mpos(text: &str, config: &PositionConfig) -> Self {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut elements = Vec::new();
        let mut events = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"event" => {
                        if let Some(event) = parse_mpos_event(&e) {
                            events.push(event);
                        }
                    }
                    b"element" => {
                        if let Some(element) = parse_mpos_element(&e) {
                            elements.push(element);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    log::warn!(
                        "POSITIONS: Malformed mpos at byte {}: {}",
                        reader.buffer_position(),
                        e
                    );
                    break;
                }
                _ => {}
            }
        }

        Self::normalize(elements, events, config)
    }

    /// Builds the index from the dense JSON shape produced by conversion sessions:
    /// `{"elements": [{id, x, y, sx, sy, page}], "events": [{elid, position}]}`.
    pub fn from_json(text: &str, config: &PositionConfig) -> Self {
        let doc: JsonPositions = match serde_json::from_str(text) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("POSITIONS: Invalid positions JSON: {}", e);
                return Self::empty();
            }
        };

        let elements = doc
            .elements
            .into_iter()
            .map(|e| RawElement {
                id: e.id.into_string(),
                x: e.x,
                y: e.y,
                sx: e.sx,
                sy: e.sy,
                page: e.page,
            })
            .collect();
        let events = doc
            .events
            .into_iter()
            .map(|e| RawEvent {
                element_id: e.elid.into_string(),
                position_ms: e.position,
            })
            .collect();

        Self::normalize(elements, events, config)
    }

    /// Picks the parser from the document's first non-blank character.
    pub fn parse(text: &str, config: &PositionConfig) -> Self {
        match text.trim_start().chars().next() {
            Some('{') => Self::from_json(text, config),
            Some(_) => Self::from_mpos(text, config),
            None => Self::empty(),
        }
    }

    fn normalize(elements: Vec<RawElement>, events: Vec<RawEvent>, config: &PositionConfig) -> Self {
        let scale = if config.scale > 0.0 { config.scale } else { 1.0 };

        let elements = elements
            .into_iter()
            .map(|raw| {
                let element = ScoreElement {
                    x: raw.x / scale,
                    y: raw.y / scale,
                    width: (raw.sx / scale).max(config.min_hit_size),
                    height: (raw.sy / scale).max(config.min_hit_size),
                    page: raw.page,
                    id: raw.id,
                };
                (element.id.clone(), element)
            })
            .collect();

        let mut events: Vec<ScoreEvent> = events
            .into_iter()
            .map(|raw| ScoreEvent {
                element_id: raw.element_id,
                time: raw.position_ms / 1000.0,
            })
            .collect();
        // Stable: equal timestamps keep document order
        events.sort_by(|a, b| a.time.total_cmp(&b.time));

        Self { events, elements }
    }

    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.elements.is_empty()
    }

    pub fn element(&self, id: &str) -> Option<&ScoreElement> {
        self.elements.get(id)
    }

    /// All timestamps at which `id` sounds, ascending.
    pub fn times_for_element(&self, id: &str) -> Vec<f64> {
        self.events
            .iter()
            .filter(|event| event.element_id == id)
            .map(|event| event.time)
            .collect()
    }

    /// Click targets of one page, in no particular order.
    pub fn elements_on_page(&self, page: usize) -> Vec<&ScoreElement> {
        self.elements.values().filter(|e| e.page == page).collect()
    }

    /// Topmost element under a page-local point.
    pub fn element_at(&self, page: usize, x: f64, y: f64) -> Option<&ScoreElement> {
        self.elements
            .values()
            .filter(|e| e.page == page && e.contains(x, y))
            .min_by(|a, b| (a.width * a.height).total_cmp(&(b.width * b.height)))
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

fn number(attrs: &HashMap<String, String>, key: &str) -> Option<f64> {
    attrs.get(key)?.trim().parse().ok()
}

fn parse_mpos_event(e: &BytesStart) -> Option<RawEvent> {
    let attrs = attributes(e);
    Some(RawEvent {
        element_id: attrs.get("elid")?.clone(),
        position_ms: number(&attrs, "position")?,
    })
}

fn parse_mpos_element(e: &BytesStart) -> Option<RawElement> {
    let attrs = attributes(e);
    Some(RawElement {
        id: attrs.get("id")?.clone(),
        x: number(&attrs, "x")?,
        y: number(&attrs, "y")?,
        sx: number(&attrs, "sx")?,
        sy: number(&attrs, "sy")?,
        page: number(&attrs, "page").map(|p| p as usize).unwrap_or(0),
    })
}

#[derive(Deserialize)]
struct JsonPositions {
    #[serde(default)]
    elements: Vec<JsonElement>,
    #[serde(default)]
    events: Vec<JsonEvent>,
}

#[derive(Deserialize)]
struct JsonElement {
    id: JsonId,
    x: f64,
    y: f64,
    sx: f64,
    sy: f64,
    #[serde(default)]
    page: usize,
}

#[derive(Deserialize)]
struct JsonEvent {
    elid: JsonId,
    position: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonId {
    Number(i64),
    Text(String),
}

impl JsonId {
    fn into_string(self) -> String {
        match self {
            JsonId::Number(n) => n.to_string(),
            JsonId::Text(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MPOS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score>
  <elements>
    <element id="0" x="120" y="240" sx="120" sy="1200" page="0"/>
    <element id="1" x="1200" y="240" sx="960" sy="1200" page="0"/>
    <element id="2" x="120" y="240" sx="2400" sy="1200" page="1"/>
  </elements>
  <events>
    <event elid="0" position="0"/>
    <event elid="1" position="2000"/>
    <event elid="2" position="4000"/>
    <event elid="1" position="6000"/>
  </events>
</score>"#;

    fn config() -> PositionConfig {
        PositionConfig::default()
    }

    #[test]
    fn test_mpos_scaling_and_units() {
        let index = PositionIndex::from_mpos(MPOS, &config());
        assert_eq!(index.events().len(), 4);
        assert_eq!(index.events()[1].time, 2.0);

        let element = index.element("2").unwrap();
        assert_eq!(element.x, 10.0);
        assert_eq!(element.width, 200.0);
        assert_eq!(element.height, 100.0);
        assert_eq!(element.page, 1);
    }

    #[test]
    fn test_min_hit_box() {
        let index = PositionIndex::from_mpos(MPOS, &config());
        // raw 120 / 12 = 10 units wide
        assert_eq!(index.element("0").unwrap().width, 64.0);
        // raw 960 / 12 = 80 units wide
        assert_eq!(index.element("1").unwrap().width, 80.0);

        let flat = r#"<score><elements>
            <element id="7" x="0" y="0" sx="960" sy="240" page="0"/>
        </elements><events/></score>"#;
        let element = PositionIndex::from_mpos(flat, &config()).element("7").cloned().unwrap();
        assert_eq!(element.width, 80.0);
        assert_eq!(element.height, 64.0);
    }

    #[test]
    fn test_json_normalizes_to_same_tables() {
        let json = r#"{
            "elements": [
                {"id": 0, "x": 120, "y": 240, "sx": 120, "sy": 1200, "page": 0},
                {"id": 1, "x": 1200, "y": 240, "sx": 960, "sy": 1200, "page": 0},
                {"id": 2, "x": 120, "y": 240, "sx": 2400, "sy": 1200, "page": 1}
            ],
            "events": [
                {"elid": 0, "position": 0},
                {"elid": 1, "position": 2000},
                {"elid": 2, "position": 4000},
                {"elid": 1, "position": 6000}
            ]
        }"#;
        assert_eq!(
            PositionIndex::from_json(json, &config()),
            PositionIndex::from_mpos(MPOS, &config())
        );
        assert_eq!(PositionIndex::parse(json, &config()).events().len(), 4);
    }

    #[test]
    fn test_empty_and_garbage_inputs() {
        assert!(PositionIndex::parse("", &config()).is_empty());
        assert!(PositionIndex::parse("<none />", &config()).is_empty());
        assert!(PositionIndex::from_json("{broken", &config()).is_empty());
    }

    #[test]
    fn test_events_sorted_and_bad_records_skipped() {
        let text = r#"<score>
            <event elid="a" position="3000"/>
            <event elid="b" position="1000"/>
            <event elid="c"/>
            <element id="a" x="0" y="0" sx="12" sy="12"/>
            <element id="b" x="oops" y="0" sx="12" sy="12" page="0"/>
        </score>"#;
        let index = PositionIndex::from_mpos(text, &config());
        let ids: Vec<&str> = index.events().iter().map(|e| e.element_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(index.element("a").is_some());
        assert!(index.element("b").is_none());
    }

    #[test]
    fn test_times_for_element_collects_repeats() {
        let index = PositionIndex::from_mpos(MPOS, &config());
        assert_eq!(index.times_for_element("1"), vec![2.0, 6.0]);
        assert!(index.times_for_element("missing").is_empty());
    }

    #[test]
    fn test_element_at_hit_testing() {
        let index = PositionIndex::from_mpos(MPOS, &config());
        assert_eq!(index.element_at(0, 12.0, 25.0).map(|e| e.id.as_str()), Some("0"));
        assert_eq!(index.element_at(1, 12.0, 25.0).map(|e| e.id.as_str()), Some("2"));
        assert!(index.element_at(0, 500.0, 500.0).is_none());
        assert_eq!(index.elements_on_page(0).len(), 2);
    }
}
