use vqlog_protocol::{MediaType, QlogEvent};

use crate::emit::EmitCandidate;

const UNSET_LEVEL: f64 = -1.0;

/// A tracked metric together with its latest reading.
///
/// Buffer levels are in seconds, the engine's native unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric<'a> {
    VideoBufferLevel(f64),
    AudioBufferLevel(f64),
    Representation(&'a str),
}

impl<'a> Metric<'a> {
    /// Buffer-level metric for `media_type`; `None` for types that are not tracked.
    pub fn buffer_level(media_type: MediaType, seconds: f64) -> Option<Self> {
        match media_type {
            MediaType::Video => Some(Self::VideoBufferLevel(seconds)),
            MediaType::Audio => Some(Self::AudioBufferLevel(seconds)),
            MediaType::Subtitles | MediaType::Other => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::VideoBufferLevel(_) => "buffer_level_video",
            Self::AudioBufferLevel(_) => "buffer_level_audio",
            Self::Representation(_) => "representation",
        }
    }
}

/// Last emitted value per metric, scoped to one session.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupCache {
    last_representation: String,
    last_buffer_level_video: f64,
    last_buffer_level_audio: f64,
    last_decoded_byte_count: u64,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self {
            last_representation: String::new(),
            last_buffer_level_video: UNSET_LEVEL,
            last_buffer_level_audio: UNSET_LEVEL,
            last_decoded_byte_count: 0,
        }
    }
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_emit(&self, metric: &Metric<'_>) -> bool {
        match *metric {
            Metric::VideoBufferLevel(level) => level != self.last_buffer_level_video,
            Metric::AudioBufferLevel(level) => level != self.last_buffer_level_audio,
            Metric::Representation(id) => id != self.last_representation,
        }
    }

    pub fn record(&mut self, metric: &Metric<'_>) {
        match *metric {
            Metric::VideoBufferLevel(level) => self.last_buffer_level_video = level,
            Metric::AudioBufferLevel(level) => self.last_buffer_level_audio = level,
            Metric::Representation(id) => {
                if self.last_representation != id {
                    self.last_representation = id.to_owned();
                }
            }
        }
    }

    /// `Emit(build())` when `metric` changed, `Unchanged` otherwise.
    pub fn candidate(
        &self,
        metric: &Metric<'_>,
        build: impl FnOnce() -> QlogEvent,
    ) -> EmitCandidate {
        if self.should_emit(metric) {
            EmitCandidate::Emit(build())
        } else {
            EmitCandidate::Unchanged
        }
    }

    pub fn last_buffer_level(&self, media_type: MediaType) -> Option<f64> {
        let level = match media_type {
            MediaType::Video => self.last_buffer_level_video,
            MediaType::Audio => self.last_buffer_level_audio,
            MediaType::Subtitles | MediaType::Other => return None,
        };
        (level != UNSET_LEVEL).then_some(level)
    }

    pub fn last_representation(&self) -> Option<&str> {
        (!self.last_representation.is_empty()).then_some(self.last_representation.as_str())
    }

    pub fn last_decoded_byte_count(&self) -> u64 {
        self.last_decoded_byte_count
    }

    /// Store `current` and return the previous reading.
    pub fn swap_decoded_byte_count(&mut self, current: u64) -> u64 {
        std::mem::replace(&mut self.last_decoded_byte_count, current)
    }
}

/// Kbps decoded between two cumulative byte readings `interval_secs` apart.
pub fn decoded_bitrate_kbps(previous: u64, current: u64, interval_secs: f64) -> f64 {
    let delta = current as f64 - previous as f64;
    ((delta / 1000.0) * 8.0) / interval_secs
}
