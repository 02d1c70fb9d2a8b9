//! Instrumentation runtime: classifies engine events, polls metrics the
//! engine does not push, suppresses unchanged readings, and gates every
//! emission on the session lifecycle.

pub mod dedup;
pub mod element;
pub mod emit;
pub mod lifecycle;
pub mod poller;
pub mod router;
pub mod session;
pub mod status;

pub use dedup::{DedupCache, Metric, decoded_bitrate_kbps};
pub use element::{ElementRouter, element_candidate};
pub use emit::{EmitCandidate, Emitter};
pub use lifecycle::SessionLifecycle;
pub use poller::{DecodedBytesPoller, MetricsPoller, PollerHandle, PollingScheduler};
pub use router::{EventRouter, RoutedEvent, normalize, request_candidate};
pub use session::{
    DEFAULT_DECODED_BYTES_INTERVAL, DEFAULT_METRICS_INTERVAL, LOG_EXPORT_NAME,
    MANIFEST_EXPORT_NAME, QlogSession, SessionConfig, SessionPorts,
};
pub use status::{
    BITRATE_KEY, BUFFER_LEVEL_AUDIO_KEY, BUFFER_LEVEL_VIDEO_KEY, FRAMERATE_KEY, STATUS_KEY,
    StatusBoard, TracingStatusDisplay, WEBKIT_BITRATE_KEY, lifecycle_status,
};
