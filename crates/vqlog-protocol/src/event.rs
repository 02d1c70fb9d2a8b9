//! Normalized qlog facts.
//!
//! `QlogEvent` has exactly one variant per call the runtime makes into the
//! log writer. `QlogRecord` is the envelope a writer stores: session id,
//! sequence number, and wall-clock timestamp around one fact.

use crate::ids::{RepresentationId, SessionId, StreamId};
use crate::media::{InteractionState, MediaType, ReadyState};
use serde::{Deserialize, Serialize};

/// Error code used for every engine- or element-reported error.
pub const ENGINE_ERROR_CODE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QlogEvent {
    RequestStarted {
        url: String,
        media_type: MediaType,
    },
    RequestUpdated {
        url: String,
        byte_length: u64,
    },
    PlaybackEnded {
        playhead_ms: f64,
    },
    StreamInitialised {
        url: String,
        autoplay: bool,
        manifest_name: String,
    },
    ReadystateChanged {
        state: ReadyState,
    },
    PlayerInteraction {
        state: InteractionState,
        playhead_ms: f64,
        playback_rate: f64,
        volume: f64,
    },
    Error {
        code: i64,
        message: String,
    },
    PlayheadProgress {
        playhead_ms: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_to_end_ms: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<StreamId>,
    },
    Rebuffer {
        playhead_ms: f64,
    },
    BufferLevelUpdate {
        media_type: MediaType,
        level_ms: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<StreamId>,
    },
    RepresentationSwitch {
        media_type: MediaType,
        representation_id: RepresentationId,
        bandwidth_bps: u64,
    },
}

impl QlogEvent {
    /// Engine/element reported error with the sentinel code.
    pub fn engine_error(message: impl Into<String>) -> Self {
        Self::Error {
            code: ENGINE_ERROR_CODE,
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestStarted { .. } => "request_started",
            Self::RequestUpdated { .. } => "request_updated",
            Self::PlaybackEnded { .. } => "playback_ended",
            Self::StreamInitialised { .. } => "stream_initialised",
            Self::ReadystateChanged { .. } => "readystate_changed",
            Self::PlayerInteraction { .. } => "player_interaction",
            Self::Error { .. } => "error",
            Self::PlayheadProgress { .. } => "playhead_progress",
            Self::Rebuffer { .. } => "rebuffer",
            Self::BufferLevelUpdate { .. } => "buffer_level_update",
            Self::RepresentationSwitch { .. } => "representation_switch",
        }
    }

    /// qlog category the fact belongs to.
    pub fn category(&self) -> &'static str {
        match self {
            Self::RequestStarted { .. } | Self::RequestUpdated { .. } => "network",
            Self::BufferLevelUpdate { .. } | Self::Rebuffer { .. } => "buffer",
            Self::RepresentationSwitch { .. } => "abr",
            Self::Error { .. } => "error",
            _ => "playback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QlogRecord {
    pub session_id: SessionId,
    pub sequence: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event: QlogEvent,
}

impl QlogRecord {
    /// Create a new record with the current timestamp.
    pub fn new(session_id: SessionId, sequence: u64, event: QlogEvent) -> Self {
        Self {
            session_id,
            sequence,
            timestamp: chrono::Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_level_update_serializes_with_tag() {
        let event = QlogEvent::BufferLevelUpdate {
            media_type: MediaType::Video,
            level_ms: 11300.0,
            stream_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "buffer_level_update");
        assert_eq!(json["media_type"], "video");
        assert_eq!(json["level_ms"], 11300.0);
        assert!(json.get("stream_id").is_none());
    }

    #[test]
    fn engine_error_uses_sentinel_code() {
        let event = QlogEvent::engine_error("playbackNotAllowed");
        assert!(matches!(
            event,
            QlogEvent::Error { code: ENGINE_ERROR_CODE, ref message } if message == "playbackNotAllowed"
        ));
        assert_eq!(event.category(), "error");
    }

    #[test]
    fn record_roundtrip_keeps_event() {
        let record = QlogRecord::new(
            SessionId::from_string("s-1"),
            7,
            QlogEvent::RepresentationSwitch {
                media_type: MediaType::Video,
                representation_id: "rep-1080p".into(),
                bandwidth_bps: 3_500_000,
            },
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: QlogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.event.name(), "representation_switch");
    }
}
