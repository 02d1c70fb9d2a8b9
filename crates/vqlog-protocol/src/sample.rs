//! Manifest and metric shapes read from the media engine.

use crate::ids::{RepresentationId, StreamId};
use serde::{Deserialize, Serialize};

/// Manifest returned by the engine's manifest retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub url: String,
    /// Parsed manifest document as the engine exposes it.
    pub document: serde_json::Value,
}

/// The stream (period) currently playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub id: StreamId,
    /// Period index used for adaptation and bandwidth lookups.
    pub index: usize,
}

/// Most recent representation switch for a media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentationSwitch {
    pub to: RepresentationId,
}

/// One quality variant listed in an adaptation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    pub id: RepresentationId,
    pub bandwidth: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Adaptation {
    pub representations: Vec<Representation>,
}

impl Adaptation {
    pub fn find(&self, id: &RepresentationId) -> Option<&Representation> {
        self.representations.iter().find(|rep| rep.id == *id)
    }
}

/// Metrics read from the engine at one point in time.
///
/// Only produced when the engine has an active stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSample {
    /// Seconds.
    pub buffer_level_video: f64,
    /// Seconds.
    pub buffer_level_audio: f64,
    /// Current video representation, set once a switch target matched the adaptation.
    pub representation_id: Option<RepresentationId>,
    pub bandwidth_bps: Option<u64>,
    /// 0 until a representation with a known frame rate is playing.
    pub frame_rate: f64,
    pub decoded_byte_count: Option<u64>,
}

impl PollSample {
    /// Display bitrate in Kbps; NaN before the first representation switch.
    pub fn bitrate_kbps(&self) -> f64 {
        self.bandwidth_bps
            .map(|bps| (bps as f64 / 1000.0).round())
            .unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(bandwidth_bps: Option<u64>) -> PollSample {
        PollSample {
            buffer_level_video: 12.0,
            buffer_level_audio: 11.0,
            representation_id: None,
            bandwidth_bps,
            frame_rate: 0.0,
            decoded_byte_count: None,
        }
    }

    #[test]
    fn adaptation_find_matches_by_id() {
        let adaptation = Adaptation {
            representations: vec![
                Representation {
                    id: "rep-720p".into(),
                    bandwidth: 1_500_000,
                    frame_rate: Some(30.0),
                },
                Representation {
                    id: "rep-1080p".into(),
                    bandwidth: 3_500_000,
                    frame_rate: Some(60.0),
                },
            ],
        };
        let found = adaptation.find(&"rep-1080p".into()).map(|rep| rep.bandwidth);
        assert_eq!(found, Some(3_500_000));
        assert!(adaptation.find(&"rep-4k".into()).is_none());
    }

    #[test]
    fn bitrate_is_nan_before_any_switch() {
        assert!(sample(None).bitrate_kbps().is_nan());
        assert_eq!(sample(Some(3_499_600)).bitrate_kbps(), 3500.0);
    }
}
