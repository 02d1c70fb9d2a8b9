//! Collaborator ports.
//!
//! These traits are the only boundary between the instrumentation runtime
//! and the outside world: the media engine (a black box exposing event
//! subscriptions and metric getters), the media element, the log writer,
//! the status display, and the exporter.
//!
//! Object-safety note:
//! - Traits use `async-trait` for async dyn-dispatch.
//! - Push sources are boxed streams (`EngineEventStream` and friends).

use crate::engine::{ElementEvent, RawEvent, RequestEvent};
use crate::error::QlogResult;
use crate::event::QlogEvent;
use crate::ids::{EventIdentifier, RepresentationId, SessionId};
use crate::media::{MediaType, ReadyState, StatusColor};
use crate::sample::{Adaptation, Manifest, RepresentationSwitch, StreamInfo};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub type EngineEventStream = BoxStream<'static, RawEvent>;
pub type RequestEventStream = BoxStream<'static, RequestEvent>;
pub type ElementEventStream = BoxStream<'static, ElementEvent>;

/// The adaptive streaming engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Every event identifier the engine can emit.
    fn event_identifiers(&self) -> Vec<EventIdentifier>;

    /// Subscribe to one event identifier.
    fn subscribe(&self, identifier: &EventIdentifier) -> EngineEventStream;

    /// Segment and manifest requests issued by the engine.
    fn request_events(&self) -> RequestEventStream;

    /// `Ok(None)` when retrieval completed without any manifest data.
    async fn retrieve_manifest(&self, url: &str) -> QlogResult<Option<Manifest>>;

    fn attach_source(&self, manifest: &Manifest, autoplay: bool) -> QlogResult<()>;

    fn active_stream(&self) -> Option<StreamInfo>;

    fn current_representation_switch(&self, media_type: MediaType)
    -> Option<RepresentationSwitch>;

    fn adaptation_for(&self, stream: &StreamInfo, media_type: MediaType) -> Option<Adaptation>;

    fn bandwidth_for_representation(
        &self,
        representation_id: &RepresentationId,
        period_index: usize,
    ) -> Option<u64>;

    /// Seconds of media buffered ahead of the playhead.
    fn current_buffer_level(&self, media_type: MediaType) -> f64;
}

/// The playback surface (an HTML media element or equivalent).
pub trait MediaElement: Send + Sync {
    fn events(&self) -> ElementEventStream;

    /// Seconds.
    fn current_time(&self) -> f64;

    fn playback_rate(&self) -> f64;

    fn volume(&self) -> f64;

    fn ready_state(&self) -> ReadyState;

    /// Cumulative decoded video bytes; `None` when the surface has no such counter.
    fn decoded_byte_count(&self) -> Option<u64>;
}

/// Turns normalized facts into a stored qlog.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Start a log for `session_id`; `title` names the exported document.
    async fn init(&self, session_id: &SessionId, title: &str) -> QlogResult<()>;

    async fn record(&self, event: QlogEvent) -> QlogResult<()>;

    /// Serialized log for export.
    async fn generate_blob(&self) -> QlogResult<String>;
}

/// Key/value display of live metrics. Never logged.
pub trait StatusDisplay: Send + Sync {
    fn set_status(&self, key: &str, value: &str, color: StatusColor);
}

/// Hands a finished artifact (log, manifest) to the user.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, filename: &str, data: &str) -> QlogResult<()>;
}
