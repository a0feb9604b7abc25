//! Content-type aware body comparison.
//!
//! # Responsibilities
//! - Decide how two captured bodies are compared from their media types
//! - Flatten JSON objects, JSON arrays and XML documents into key/value sets
//! - Delegate the key-level comparison to [`diff_maps`]
//!
//! # Design Decisions
//! - Media types are compared without parameters (`charset`, `boundary`)
//! - A media type mismatch is a difference on its own; no structural diff follows
//! - Parse failures never escape: they degrade to `equal: false` with a recorded failure
//! - Bodies in any other format are compared byte for byte

use std::collections::{BTreeMap, HashMap};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::mirror::map_diff::{diff_maps, MapDiffResult};
use crate::mirror::Side;

/// Structural diff of two JSON objects, keyed by flattened path.
pub type JsonObjectDiff = MapDiffResult<String, Value>;

/// Structural diff of two JSON arrays, keyed by position.
pub type JsonArrayDiff = MapDiffResult<usize, Value>;

/// Structural diff of two XML documents, keyed by node path.
pub type XmlDiff = MapDiffResult<String, String>;

/// Structured comparison attached to a [`BodyDiffResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "diff", rename_all = "snake_case")]
pub enum BodyDiffDetail {
    JsonObject(JsonObjectDiff),
    JsonArray(JsonArrayDiff),
    Xml(XmlDiff),
}

/// Reason a body pair could not be compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyDiffFailure {
    #[error("content type mismatch: main {main:?}, shadow {shadow:?}")]
    ContentTypeMismatch { main: String, shadow: String },

    #[error("{side} body is not valid JSON: {reason}")]
    InvalidJson { side: Side, reason: String },

    #[error("{side} body is not valid XML: {reason}")]
    InvalidXml { side: Side, reason: String },

    #[error("JSON shape mismatch: main is {main}, shadow is {shadow}")]
    ShapeMismatch {
        main: &'static str,
        shadow: &'static str,
    },
}

/// Outcome of comparing two bodies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyDiffResult {
    pub equal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<BodyDiffDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<BodyDiffFailure>,
}

impl BodyDiffResult {
    fn plain(equal: bool) -> Self {
        Self {
            equal,
            detail: None,
            failure: None,
        }
    }

    fn failed(failure: BodyDiffFailure) -> Self {
        Self {
            equal: false,
            detail: None,
            failure: Some(failure),
        }
    }

    fn structural(detail: BodyDiffDetail) -> Self {
        let equal = match &detail {
            BodyDiffDetail::JsonObject(diff) => !diff.has_differences(),
            BodyDiffDetail::JsonArray(diff) => !diff.has_differences(),
            BodyDiffDetail::Xml(diff) => !diff.has_differences(),
        };
        Self {
            equal,
            detail: Some(detail),
            failure: None,
        }
    }
}

/// How a media type is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFormat {
    Json,
    Xml,
    Opaque,
}

/// Strip parameters and normalize case: `Application/JSON; charset=utf-8` → `application/json`.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Body comparator configured with the media types it parses.
#[derive(Debug, Clone)]
pub struct BodyDiffer {
    json_media_types: Vec<String>,
    xml_media_types: Vec<String>,
}

impl Default for BodyDiffer {
    fn default() -> Self {
        Self::new(["application/json"], ["application/xml", "text/xml"])
    }
}

impl BodyDiffer {
    /// Create a differ that parses the given JSON and XML media types.
    ///
    /// Structured syntax suffixes (`+json`, `+xml`) are always recognised.
    pub fn new<J, X>(json_media_types: J, xml_media_types: X) -> Self
    where
        J: IntoIterator,
        J::Item: AsRef<str>,
        X: IntoIterator,
        X::Item: AsRef<str>,
    {
        Self {
            json_media_types: json_media_types
                .into_iter()
                .map(|m| media_type(m.as_ref()))
                .collect(),
            xml_media_types: xml_media_types
                .into_iter()
                .map(|m| media_type(m.as_ref()))
                .collect(),
        }
    }

    fn format_of(&self, media_type: &str) -> BodyFormat {
        if self.json_media_types.iter().any(|m| m == media_type) || media_type.ends_with("+json") {
            BodyFormat::Json
        } else if self.xml_media_types.iter().any(|m| m == media_type)
            || media_type.ends_with("+xml")
        {
            BodyFormat::Xml
        } else {
            BodyFormat::Opaque
        }
    }

    /// Compare two bodies using their declared content types.
    pub fn diff(
        &self,
        main: &[u8],
        main_content_type: &str,
        shadow: &[u8],
        shadow_content_type: &str,
    ) -> BodyDiffResult {
        if main.is_empty() && shadow.is_empty() {
            return BodyDiffResult::plain(true);
        }

        let main_type = media_type(main_content_type);
        let shadow_type = media_type(shadow_content_type);
        if main_type != shadow_type {
            return BodyDiffResult::failed(BodyDiffFailure::ContentTypeMismatch {
                main: main_type,
                shadow: shadow_type,
            });
        }

        match self.format_of(&main_type) {
            BodyFormat::Json => diff_json(main, shadow),
            BodyFormat::Xml => diff_xml(main, shadow),
            BodyFormat::Opaque => BodyDiffResult::plain(main == shadow),
        }
    }
}

fn parse_json(side: Side, body: &[u8]) -> Result<Value, BodyDiffFailure> {
    serde_json::from_slice(body).map_err(|e| BodyDiffFailure::InvalidJson {
        side,
        reason: e.to_string(),
    })
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn diff_json(main: &[u8], shadow: &[u8]) -> BodyDiffResult {
    let (main, shadow) = match (parse_json(Side::Main, main), parse_json(Side::Shadow, shadow)) {
        (Ok(main), Ok(shadow)) => (main, shadow),
        (Err(failure), _) | (_, Err(failure)) => return BodyDiffResult::failed(failure),
    };

    match (&main, &shadow) {
        (Value::Object(main), Value::Object(shadow)) => {
            let main = flatten_object(main);
            let shadow = flatten_object(shadow);
            BodyDiffResult::structural(BodyDiffDetail::JsonObject(diff_maps(
                &main,
                &shadow,
                |a, b| a == b,
            )))
        }
        (Value::Array(main), Value::Array(shadow)) => {
            let main = index_array(main);
            let shadow = index_array(shadow);
            BodyDiffResult::structural(BodyDiffDetail::JsonArray(diff_maps(
                &main,
                &shadow,
                |a, b| a == b,
            )))
        }
        (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
            BodyDiffResult::failed(BodyDiffFailure::ShapeMismatch {
                main: shape_name(&main),
                shadow: shape_name(&shadow),
            })
        }
        (main, shadow) => BodyDiffResult::plain(main == shadow),
    }
}

/// Flatten nested objects to `a.b` and nested arrays to `a[0]`.
///
/// Empty containers are kept as leaves so `{"a": {}}` still differs from `{}`.
/// Object keys have `.`, `[`, `]` and `\` escaped with `\`, so `{"a.b": 1}`
/// flattens to `a\.b` and never collides with `{"a": {"b": 1}}`.
fn flatten_object(object: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    for (key, value) in object {
        flatten_into(escape_key(key), value, &mut flat);
    }
    flat
}

fn flatten_into(path: String, value: &Value, flat: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(object) if !object.is_empty() => {
            for (key, child) in object {
                flatten_into(format!("{path}.{}", escape_key(key)), child, flat);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(format!("{path}[{index}]"), child, flat);
            }
        }
        leaf => {
            flat.insert(path, leaf.clone());
        }
    }
}

fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for c in key.chars() {
        if matches!(c, '.' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn index_array(items: &[Value]) -> BTreeMap<usize, Value> {
    items.iter().cloned().enumerate().collect()
}

fn diff_xml(main: &[u8], shadow: &[u8]) -> BodyDiffResult {
    let main = xml_node_set(main).map_err(|reason| BodyDiffFailure::InvalidXml {
        side: Side::Main,
        reason,
    });
    let shadow = xml_node_set(shadow).map_err(|reason| BodyDiffFailure::InvalidXml {
        side: Side::Shadow,
        reason,
    });

    match (main, shadow) {
        (Ok(main), Ok(shadow)) => {
            let diff = diff_maps(&main, &shadow, |a, b| a == b);
            BodyDiffResult::structural(BodyDiffDetail::Xml(diff))
        }
        (Err(failure), _) | (_, Err(failure)) => BodyDiffResult::failed(failure),
    }
}

struct XmlFrame {
    path: String,
    text: String,
    children: HashMap<String, usize>,
}

impl XmlFrame {
    fn new(path: String) -> Self {
        Self {
            path,
            text: String::new(),
            children: HashMap::new(),
        }
    }

    /// Path of the next child named `name`; repeated siblings get `[n]`.
    fn child_path(&mut self, name: &str) -> String {
        let seen = self.children.entry(name.to_string()).or_insert(0);
        let path = if *seen == 0 {
            format!("{}/{}", self.path, name)
        } else {
            format!("{}/{}[{}]", self.path, name, seen)
        };
        *seen += 1;
        path
    }
}

/// Normalize an XML document into `element path → text` and `element path@attr → value`.
fn xml_node_set(body: &[u8]) -> Result<BTreeMap<String, String>, String> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut nodes = BTreeMap::new();
    let mut document = XmlFrame::new(String::new());
    let mut open: Vec<XmlFrame> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => {
                let parent = open.last_mut().unwrap_or(&mut document);
                let path = open_element(parent, &element, &mut nodes)?;
                open.push(XmlFrame::new(path));
            }
            Ok(Event::Empty(element)) => {
                let parent = open.last_mut().unwrap_or(&mut document);
                let path = open_element(parent, &element, &mut nodes)?;
                nodes.insert(path, String::new());
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                if let Some(frame) = open.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(frame) = open.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(frame) = open.pop() {
                    nodes.insert(frame.path, frame.text.trim().to_string());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
        buf.clear();
    }

    if let Some(frame) = open.last() {
        return Err(format!("unclosed element {}", frame.path));
    }
    if document.children.is_empty() {
        return Err("document has no root element".to_string());
    }
    Ok(nodes)
}

fn open_element(
    parent: &mut XmlFrame,
    element: &BytesStart<'_>,
    nodes: &mut BTreeMap<String, String>,
) -> Result<String, String> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let path = parent.child_path(&name);

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(|e| e.to_string())?;
        nodes.insert(format!("{path}@{key}"), value.into_owned());
    }

    Ok(path)
}
