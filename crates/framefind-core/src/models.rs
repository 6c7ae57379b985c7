//! Core data models used throughout framefind.
//!
//! Hits from every modality, whether they come from the primary store or the
//! backup corpus, are decoded into one of the record types below. Each record
//! keeps the fields it does not understand in an `extra` map so that nothing
//! identifying is lost on the way to the response.

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Frame identifier within a single video.
pub type FrameId = u64;

/// Comparison operator applied when none is supplied by the caller.
pub const DEFAULT_OPERATOR: &str = "gte";

/// Per-label count compared against when none is supplied by the caller.
pub const DEFAULT_COUNT: i64 = 1;

/// Date layout used by per-video metadata records.
pub const PUBLISH_DATE_FORMAT: &str = "%d/%m/%Y";

/// One retrieval mode. The lowercase names double as response keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Visual-semantic search from a text query.
    Clip,
    /// On-screen text.
    Ocr,
    /// Speech transcript.
    Asr,
    /// Detected objects.
    Object,
    /// Visual-semantic search from a query image.
    Image,
}

impl Modality {
    pub const ALL: [Modality; 5] = [
        Modality::Clip,
        Modality::Ocr,
        Modality::Object,
        Modality::Asr,
        Modality::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Clip => "clip",
            Modality::Ocr => "ocr",
            Modality::Asr => "asr",
            Modality::Object => "object",
            Modality::Image => "image",
        }
    }

    /// True for modalities searched by free-text match in the primary store.
    pub fn is_text(&self) -> bool {
        matches!(self, Modality::Ocr | Modality::Asr)
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical `(video, frame)` key. Frame ids are only comparable within the
/// same video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameLocator {
    pub video_id: String,
    pub frame_id: FrameId,
}

impl FrameLocator {
    pub fn new(video_id: impl Into<String>, frame_id: FrameId) -> Self {
        Self {
            video_id: video_id.into(),
            frame_id,
        }
    }
}

impl fmt::Display for FrameLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.video_id, self.frame_id)
    }
}

/// A text field holding either one string or several (e.g. OCR lines).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    One(String),
    Many(Vec<String>),
}

impl Default for TextField {
    fn default() -> Self {
        TextField::One(String::new())
    }
}

impl TextField {
    /// All elements of the field as a slice.
    pub fn lines(&self) -> &[String] {
        match self {
            TextField::One(s) => std::slice::from_ref(s),
            TextField::Many(v) => v,
        }
    }
}

fn parse_frame_id<E: de::Error>(value: Value) -> Result<Option<FrameId>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .map(Some)
            .ok_or_else(|| E::custom(format!("frame_id is not a non-negative integer: {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<FrameId>()
            .map(Some)
            .map_err(|_| E::custom(format!("frame_id is not numeric: {:?}", s))),
        other => Err(E::custom(format!("unsupported frame_id: {}", other))),
    }
}

/// Accepts integers and numeric strings such as `"001234"`.
fn de_frame_id<'de, D>(deserializer: D) -> Result<FrameId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_frame_id(value)?.ok_or_else(|| de::Error::custom("frame_id is null"))
}

fn de_opt_frame_id<'de, D>(deserializer: D) -> Result<Option<FrameId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        Some(v) => parse_frame_id(v),
        None => Ok(None),
    }
}

/// A keyframe from the visual-semantic corpus (`clip` and `image`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(alias = "video_name")]
    pub video_id: String,
    #[serde(deserialize_with = "de_frame_id")]
    pub frame_id: FrameId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_folder: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An on-screen text record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    #[serde(alias = "video_name")]
    pub video_id: String,
    #[serde(default, deserialize_with = "de_opt_frame_id")]
    pub frame_id: Option<FrameId>,
    #[serde(default)]
    pub text: TextField,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A time-ranged speech transcript segment.
///
/// `frame_id` is empty until temporal alignment binds the segment to a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRecord {
    #[serde(alias = "video_name")]
    pub video_id: String,
    #[serde(default)]
    pub text: TextField,
    /// Segment start, in seconds.
    #[serde(alias = "start_time")]
    pub start: f64,
    #[serde(default, alias = "end_time", skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(
        default,
        deserialize_with = "de_opt_frame_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub frame_id: Option<FrameId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Object detections for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    #[serde(alias = "video_name")]
    pub video_id: String,
    #[serde(deserialize_with = "de_frame_id")]
    pub frame_id: FrameId,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub label_counts: HashMap<String, i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectRecord {
    /// Case-insensitive label membership.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Occurrence count for `label`, 0 when the label has no count entry.
    pub fn count_for(&self, label: &str) -> i64 {
        if let Some(count) = self.label_counts.get(label) {
            return *count;
        }
        self.label_counts
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(label))
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }
}

/// Modality-specific raw record from the primary store or the backup corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawHit {
    Frame(FrameRecord),
    Text(TextRecord),
    Speech(SpeechRecord),
    Object(ObjectRecord),
}

impl RawHit {
    /// Decode a stored JSON document as a hit of the given modality.
    pub fn decode(modality: Modality, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match modality {
            Modality::Clip | Modality::Image => RawHit::Frame(serde_json::from_value(value)?),
            Modality::Ocr => RawHit::Text(serde_json::from_value(value)?),
            Modality::Asr => RawHit::Speech(serde_json::from_value(value)?),
            Modality::Object => RawHit::Object(serde_json::from_value(value)?),
        })
    }

    /// Owning video of the hit, whatever its modality.
    pub fn video_id(&self) -> &str {
        match self {
            RawHit::Frame(r) => &r.video_id,
            RawHit::Text(r) => &r.video_id,
            RawHit::Speech(r) => &r.video_id,
            RawHit::Object(r) => &r.video_id,
        }
    }

    /// Canonical locator, if the hit carries a frame.
    pub fn locator(&self) -> Option<FrameLocator> {
        let frame_id = match self {
            RawHit::Frame(r) => Some(r.frame_id),
            RawHit::Text(r) => r.frame_id,
            RawHit::Speech(r) => r.frame_id,
            RawHit::Object(r) => Some(r.frame_id),
        }?;
        Some(FrameLocator::new(self.video_id(), frame_id))
    }

    /// Text elements used for fuzzy matching; empty for non-text hits.
    pub fn text_lines(&self) -> &[String] {
        match self {
            RawHit::Text(r) => r.text.lines(),
            RawHit::Speech(r) => r.text.lines(),
            RawHit::Frame(_) | RawHit::Object(_) => &[],
        }
    }
}

/// A hit with its catalog paths resolved. Unresolvable paths stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedHit {
    #[serde(flatten)]
    pub hit: RawHit,
    pub image_path: Option<String>,
    pub video_path: Option<String>,
    pub fps: Option<f64>,
    /// Relevance score from the primary store; absent for backup hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl ResolvedHit {
    pub fn video_id(&self) -> &str {
        self.hit.video_id()
    }

    pub fn locator(&self) -> Option<FrameLocator> {
        self.hit.locator()
    }
}

/// Per-video recording metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub video_id: String,
    pub publish_date: NaiveDate,
}

impl VideoMetadata {
    /// Build from a per-video JSON record carrying `publish_date` as `DD/MM/YYYY`.
    ///
    /// Returns `None` when the field is missing or malformed.
    pub fn from_record(video_id: impl Into<String>, record: &Value) -> Option<Self> {
        let raw = record.get("publish_date")?.as_str()?;
        let publish_date = NaiveDate::parse_from_str(raw.trim(), PUBLISH_DATE_FORMAT).ok()?;
        Some(Self {
            video_id: video_id.into(),
            publish_date,
        })
    }
}

/// Numeric comparison applied to a per-label occurrence count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountOperator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl CountOperator {
    /// Parse `lt`, `lte`, `gt`, `gte` or `eq`. Anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lt" => Some(CountOperator::Lt),
            "lte" => Some(CountOperator::Lte),
            "gt" => Some(CountOperator::Gt),
            "gte" => Some(CountOperator::Gte),
            "eq" => Some(CountOperator::Eq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CountOperator::Lt => "lt",
            CountOperator::Lte => "lte",
            CountOperator::Gt => "gt",
            CountOperator::Gte => "gte",
            CountOperator::Eq => "eq",
        }
    }

    pub fn compare(&self, count: i64, value: i64) -> bool {
        match self {
            CountOperator::Lt => count < value,
            CountOperator::Lte => count <= value,
            CountOperator::Gt => count > value,
            CountOperator::Gte => count >= value,
            CountOperator::Eq => count == value,
        }
    }
}

/// Structured object-detection query.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectQuery {
    pub label: String,
    /// `None` when the caller supplied an unrecognized operator; such a query
    /// matches nothing.
    pub operator: Option<CountOperator>,
    pub value: i64,
    /// Optional restriction to explicit `(video, frame)` pairs.
    pub restrict_to: Option<HashSet<FrameLocator>>,
}

impl ObjectQuery {
    pub fn new(label: impl Into<String>, operator: &str, value: i64) -> Self {
        Self {
            label: label.into(),
            operator: CountOperator::parse(operator),
            value,
            restrict_to: None,
        }
    }

    pub fn restricted_to(mut self, allowed: HashSet<FrameLocator>) -> Self {
        self.restrict_to = Some(allowed);
        self
    }

    /// In-memory evaluation of the query against one record.
    pub fn matches(&self, record: &ObjectRecord) -> bool {
        let Some(op) = self.operator else {
            return false;
        };
        if !record.has_label(&self.label) {
            return false;
        }
        if let Some(allowed) = &self.restrict_to {
            let locator = FrameLocator::new(record.video_id.clone(), record.frame_id);
            if !allowed.contains(&locator) {
                return false;
            }
        }
        op.compare(record.count_for(&self.label), self.value)
    }
}
