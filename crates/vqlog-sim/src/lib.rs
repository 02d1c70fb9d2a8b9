//! Scripted stand-ins for a media engine and its playback element.

mod element;
mod engine;

pub use element::ScriptedElement;
pub use engine::{DASHJS_EVENT_IDENTIFIERS, ScriptedEngine};
