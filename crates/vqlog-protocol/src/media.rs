//! Media vocabulary shared by the engine, the element, and the log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media track a fact refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Audio,
    Subtitles,
    /// Manifests, init data, and anything the URL does not reveal.
    Other,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitles => "subtitles",
            Self::Other => "other",
        }
    }

    /// Parse the engine's media type label (`"video"`, `"audio"`, `"text"`, ...).
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "text" | "subtitle" | "subtitles" | "fragmentedtext" => Self::Subtitles,
            _ => Self::Other,
        }
    }

    /// Best-effort guess of a request's media type from its URL path.
    pub fn infer_from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if path.contains("video") {
            Self::Video
        } else if path.contains("audio") {
            Self::Audio
        } else if path.contains("subtitle")
            || path.contains("text")
            || path.ends_with(".vtt")
            || path.ends_with(".ttml")
        {
            Self::Subtitles
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the viewer did to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Play,
    Pause,
    Seek,
    Speed,
    Volume,
}

/// HTML media element ready state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// Map the numeric `readyState` (0..=4); larger values clamp to `HaveEnoughData`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::HaveNothing,
            1 => Self::HaveMetadata,
            2 => Self::HaveCurrentData,
            3 => Self::HaveFutureData,
            _ => Self::HaveEnoughData,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Color hint for a status display entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusColor {
    Black,
    Orange,
    Green,
    Red,
}

impl StatusColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::Orange => "orange",
            Self::Green => "green",
            Self::Red => "red",
        }
    }
}
