//! Payloads pushed by the media engine and the media element.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Log-relevant category an engine event identifier is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Buffer,
    Progress,
    Error,
    /// Media-element driven; never assigned to engine identifiers.
    Interaction,
    /// Recognized, deliberately not subscribed.
    Ignored,
    /// Not in any policy list; surfaced through a diagnostic.
    Unclassified,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Progress => "progress",
            Self::Error => "error",
            Self::Interaction => "interaction",
            Self::Ignored => "ignored",
            Self::Unclassified => "unclassified",
        }
    }

    /// Whether identifiers of this category get an engine subscription.
    pub fn is_subscribed(self) -> bool {
        !matches!(self, Self::Ignored | Self::Interaction)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque payload delivered with an engine event.
///
/// Field names follow the engine (`mediaType`, `bufferLevel`, `streamId`,
/// `time`, `timeToEnd`, `type`, `message`). Handlers read only what their
/// category needs; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(Map<String, Value>);

impl RawEvent {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; non-object values produce an empty payload.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// String or numeric field rendered as a string (stream ids come in both forms).
    pub fn id_field(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<Value> for RawEvent {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

/// Standard media element lifecycle events the runtime listens to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementEvent {
    CanPlay,
    Play,
    Pause,
    Seeking,
    TimeUpdate,
    Progress,
    RateChange,
    LoadedMetadata,
    LoadedData,
    CanPlayThrough,
    Stalled,
    VolumeChange,
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ElementEvent {
    /// DOM event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CanPlay => "canplay",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Seeking => "seeking",
            Self::TimeUpdate => "timeupdate",
            Self::Progress => "progress",
            Self::RateChange => "ratechange",
            Self::LoadedMetadata => "loadedmetadata",
            Self::LoadedData => "loadeddata",
            Self::CanPlayThrough => "canplaythrough",
            Self::Stalled => "stalled",
            Self::VolumeChange => "volumechange",
            Self::Error { .. } => "error",
        }
    }
}

/// Network request lifecycle observed by the engine's request hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestEvent {
    Started { url: String },
    Completed { url: String, byte_length: u64 },
}
