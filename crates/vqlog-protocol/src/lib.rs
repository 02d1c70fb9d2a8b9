//! # vqlog-protocol: shared contract for the vqlog workspace
//!
//! This crate defines the shared types, the normalized qlog fact taxonomy,
//! and the trait interfaces (ports) that the instrumentation runtime uses to
//! talk to its collaborators: the media engine, the media element, the log
//! writer, the status display, and the exporter.
//!
//! It carries no runtime dependencies (no tokio) so collaborators can
//! implement the ports without pulling in the runtime.
//!
//! ## Module Overview
//!
//! - [`ids`]: Typed ID wrappers (SessionId, StreamId, RepresentationId, EventIdentifier)
//! - [`media`]: MediaType, InteractionState, ReadyState, StatusColor
//! - [`engine`]: EventCategory, RawEvent, ElementEvent, RequestEvent
//! - [`sample`]: Manifest, StreamInfo, Representation, PollSample
//! - [`event`]: QlogEvent (one variant per normalized fact) + QlogRecord
//! - [`session`]: LifecycleState
//! - [`ports`]: Collaborator boundary traits
//! - [`error`]: QlogError, QlogResult

pub mod engine;
pub mod error;
pub mod event;
pub mod ids;
pub mod media;
pub mod ports;
pub mod sample;
pub mod session;

// Re-export the most commonly used types at the crate root.
pub use engine::{ElementEvent, EventCategory, RawEvent, RequestEvent};
pub use error::{QlogError, QlogResult};
pub use event::{ENGINE_ERROR_CODE, QlogEvent, QlogRecord};
pub use ids::{EventIdentifier, RepresentationId, SessionId, StreamId};
pub use media::{InteractionState, MediaType, ReadyState, StatusColor};
pub use ports::{
    ElementEventStream, EngineEventStream, Exporter, LogWriter, MediaElement, MediaEngine,
    RequestEventStream, StatusDisplay,
};
pub use sample::{Adaptation, Manifest, PollSample, Representation, RepresentationSwitch, StreamInfo};
pub use session::LifecycleState;
