use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;
use vqlog_protocol::{LifecycleState, StatusColor, StatusDisplay};

pub const STATUS_KEY: &str = "status";
pub const BUFFER_LEVEL_VIDEO_KEY: &str = "buffer level (video)";
pub const BUFFER_LEVEL_AUDIO_KEY: &str = "buffer level (audio)";
pub const FRAMERATE_KEY: &str = "framerate";
pub const BITRATE_KEY: &str = "bitrate";
pub const WEBKIT_BITRATE_KEY: &str = "bitrate (webkit)";

/// Value and color shown under the `status` key for a lifecycle state.
pub fn lifecycle_status(state: LifecycleState) -> (&'static str, StatusColor) {
    match state {
        LifecycleState::Uninitialised => ("uninitialised", StatusColor::Black),
        LifecycleState::Initialising => ("initialising", StatusColor::Orange),
        LifecycleState::Initialised => ("initialised", StatusColor::Green),
        LifecycleState::Active => ("logging", StatusColor::Green),
        LifecycleState::Stopped => ("stopped", StatusColor::Black),
    }
}

/// Renders status updates as debug events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusDisplay;

impl StatusDisplay for TracingStatusDisplay {
    fn set_status(&self, key: &str, value: &str, color: StatusColor) {
        debug!(key, value, color = color.as_str(), "status");
    }
}

/// In-memory status display, keeping keys in first-set order.
#[derive(Debug, Default)]
pub struct StatusBoard {
    items: Mutex<IndexMap<String, (String, StatusColor)>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<(String, StatusColor)> {
        self.items.lock().get(key).cloned()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.get(key).map(|(value, _)| value)
    }

    pub fn snapshot(&self) -> Vec<(String, String, StatusColor)> {
        self.items
            .lock()
            .iter()
            .map(|(key, (value, color))| (key.clone(), value.clone(), *color))
            .collect()
    }
}

impl StatusDisplay for StatusBoard {
    fn set_status(&self, key: &str, value: &str, color: StatusColor) {
        self.items
            .lock()
            .insert(key.to_owned(), (value.to_owned(), color));
    }
}
