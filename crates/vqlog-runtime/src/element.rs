use std::sync::Arc;

use tracing::debug;
use vqlog_protocol::{ElementEvent, InteractionState, MediaElement, QlogEvent};

use crate::emit::{EmitCandidate, Emitter};

const ELEMENT_ERROR_FALLBACK: &str = "media element error";

/// Routes media element events, reading the element's live state per event.
#[derive(Clone)]
pub struct ElementRouter {
    element: Arc<dyn MediaElement>,
    emitter: Emitter,
}

impl ElementRouter {
    pub fn new(element: Arc<dyn MediaElement>, emitter: Emitter) -> Self {
        Self { element, emitter }
    }

    pub async fn dispatch(&self, event: ElementEvent) -> bool {
        if !self.emitter.is_open() {
            return false;
        }
        let candidate = element_candidate(&event, self.element.as_ref());
        debug!(
            element_event = event.name(),
            fact = fact_label(&candidate).as_deref().unwrap_or("none"),
            "element event"
        );
        self.emitter.emit(candidate).await
    }
}

fn interaction(state: InteractionState, element: &dyn MediaElement) -> QlogEvent {
    QlogEvent::PlayerInteraction {
        state,
        playhead_ms: element.current_time() * 1000.0,
        playback_rate: element.playback_rate(),
        volume: element.volume(),
    }
}

/// qlog `category:name` of the fact a candidate would record.
fn fact_label(candidate: &EmitCandidate) -> Option<String> {
    candidate
        .event()
        .map(|fact| format!("{}:{}", fact.category(), fact.name()))
}

pub fn element_candidate(event: &ElementEvent, element: &dyn MediaElement) -> EmitCandidate {
    let fact = match event {
        ElementEvent::Play => interaction(InteractionState::Play, element),
        ElementEvent::Pause => interaction(InteractionState::Pause, element),
        ElementEvent::Seeking => interaction(InteractionState::Seek, element),
        ElementEvent::RateChange => interaction(InteractionState::Speed, element),
        ElementEvent::VolumeChange => interaction(InteractionState::Volume, element),
        ElementEvent::CanPlay
        | ElementEvent::LoadedMetadata
        | ElementEvent::LoadedData
        | ElementEvent::CanPlayThrough => QlogEvent::ReadystateChanged {
            state: element.ready_state(),
        },
        ElementEvent::TimeUpdate | ElementEvent::Progress => QlogEvent::PlayheadProgress {
            playhead_ms: element.current_time() * 1000.0,
            time_to_end_ms: None,
            stream_id: None,
        },
        ElementEvent::Stalled => QlogEvent::Rebuffer {
            playhead_ms: element.current_time() * 1000.0,
        },
        ElementEvent::Error { message } => QlogEvent::engine_error(
            message
                .as_deref()
                .filter(|m| !m.is_empty())
                .unwrap_or(ELEMENT_ERROR_FALLBACK),
        ),
    };
    EmitCandidate::Emit(fact)
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use vqlog_protocol::{ElementEventStream, ReadyState};

    use super::*;

    struct FixedElement;

    impl MediaElement for FixedElement {
        fn events(&self) -> ElementEventStream {
            Box::pin(stream::empty())
        }

        fn current_time(&self) -> f64 {
            12.5
        }

        fn playback_rate(&self) -> f64 {
            1.5
        }

        fn volume(&self) -> f64 {
            0.8
        }

        fn ready_state(&self) -> ReadyState {
            ReadyState::HaveEnoughData
        }

        fn decoded_byte_count(&self) -> Option<u64> {
            None
        }
    }

    #[test]
    fn viewer_actions_become_interactions() {
        let candidate = element_candidate(&ElementEvent::RateChange, &FixedElement);
        assert_eq!(
            candidate,
            EmitCandidate::Emit(QlogEvent::PlayerInteraction {
                state: InteractionState::Speed,
                playhead_ms: 12500.0,
                playback_rate: 1.5,
                volume: 0.8,
            })
        );
    }

    #[test]
    fn labels_name_the_recorded_fact() {
        let label = |event: ElementEvent| fact_label(&element_candidate(&event, &FixedElement));
        assert_eq!(label(ElementEvent::Seeking).as_deref(), Some("playback:player_interaction"));
        assert_eq!(label(ElementEvent::CanPlay).as_deref(), Some("playback:readystate_changed"));
        assert_eq!(label(ElementEvent::Stalled).as_deref(), Some("buffer:rebuffer"));
        assert_eq!(fact_label(&EmitCandidate::NoSample), None);
    }

    #[test]
    fn readiness_events_report_ready_state() {
        for event in [
            ElementEvent::CanPlay,
            ElementEvent::LoadedMetadata,
            ElementEvent::LoadedData,
            ElementEvent::CanPlayThrough,
        ] {
            assert_eq!(
                element_candidate(&event, &FixedElement),
                EmitCandidate::Emit(QlogEvent::ReadystateChanged {
                    state: ReadyState::HaveEnoughData
                })
            );
        }
    }

    #[test]
    fn stall_and_error_facts() {
        assert_eq!(
            element_candidate(&ElementEvent::Stalled, &FixedElement),
            EmitCandidate::Emit(QlogEvent::Rebuffer {
                playhead_ms: 12500.0
            })
        );
        assert_eq!(
            element_candidate(&ElementEvent::Error { message: None }, &FixedElement),
            EmitCandidate::Emit(QlogEvent::engine_error("media element error"))
        );
        assert_eq!(
            element_candidate(
                &ElementEvent::Error {
                    message: Some("MEDIA_ERR_DECODE".to_owned())
                },
                &FixedElement
            ),
            EmitCandidate::Emit(QlogEvent::engine_error("MEDIA_ERR_DECODE"))
        );
    }
}
