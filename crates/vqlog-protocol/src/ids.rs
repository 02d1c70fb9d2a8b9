//! Typed ID wrappers.
//!
//! IDs are opaque String wrappers (serde-transparent). Engine-facing IDs
//! (stream ids, representation ids, event identifiers) are whatever the
//! media engine hands out; only session ids are generated here.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Unique identifier for a logging session.
    SessionId
);
typed_id!(
    /// Identifier of a stream (DASH period) as reported by the media engine.
    StreamId
);
typed_id!(
    /// Identifier of one quality variant of a media track.
    RepresentationId
);
typed_id!(
    /// Name of an event the media engine can emit, e.g. `bufferLevelUpdated`.
    EventIdentifier
);

impl SessionId {
    /// Create a new session ID using UUID v4 (random).
    pub fn new_uuid() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new_uuid()
    }
}

impl RepresentationId {
    /// The "never seen" sentinel used by the dedup cache.
    pub fn unset() -> Self {
        Self(String::new())
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_empty()
    }
}
