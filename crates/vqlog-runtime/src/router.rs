use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};
use vqlog_policy::ClassificationTable;
use vqlog_protocol::{
    EventCategory, EventIdentifier, MediaEngine, MediaType, QlogEvent, RawEvent, RequestEvent,
    StreamId,
};

use crate::emit::{EmitCandidate, Emitter};

/// An engine event tagged with the category it was classified into.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedEvent {
    pub identifier: EventIdentifier,
    pub category: EventCategory,
    pub payload: RawEvent,
}

/// Dispatches engine events to per-category handlers using a table fixed at setup.
#[derive(Clone)]
pub struct EventRouter {
    table: ClassificationTable,
    emitter: Emitter,
}

impl EventRouter {
    pub fn new(table: ClassificationTable, emitter: Emitter) -> Self {
        Self { table, emitter }
    }

    pub fn table(&self) -> &ClassificationTable {
        &self.table
    }

    /// One merged stream over every subscribed identifier.
    pub fn subscribe_all(&self, engine: &dyn MediaEngine) -> BoxStream<'static, RoutedEvent> {
        let streams: Vec<_> = self
            .table
            .subscribed()
            .map(|(identifier, category)| {
                let identifier = identifier.clone();
                engine
                    .subscribe(&identifier)
                    .map(move |payload| RoutedEvent {
                        identifier: identifier.clone(),
                        category,
                        payload,
                    })
                    .boxed()
            })
            .collect();
        debug!(subscriptions = streams.len(), "engine subscriptions registered");
        stream::select_all(streams).boxed()
    }

    /// Look up `identifier` in the table and dispatch. Unknown identifiers are ignored.
    pub async fn route(&self, identifier: &EventIdentifier, payload: RawEvent) -> bool {
        match self.table.get(identifier) {
            Some(category) => self.dispatch(identifier, category, payload).await,
            None => {
                debug!(identifier = %identifier, "event not in classification table");
                false
            }
        }
    }

    /// Run the handler for `category`. Returns `true` when a fact was written.
    pub async fn dispatch(
        &self,
        identifier: &EventIdentifier,
        category: EventCategory,
        payload: RawEvent,
    ) -> bool {
        if !self.emitter.is_open() {
            return false;
        }
        let candidate = normalize(identifier, category, &payload);
        if candidate == EmitCandidate::NoSample
            && matches!(category, EventCategory::Buffer | EventCategory::Progress)
        {
            debug!(
                identifier = %identifier,
                category = %category,
                fields = ?payload.keys().collect::<Vec<_>>(),
                "payload missing required fields"
            );
        }
        self.emitter.emit(candidate).await
    }

    pub async fn dispatch_routed(&self, event: RoutedEvent) -> bool {
        self.dispatch(&event.identifier, event.category, event.payload)
            .await
    }
}

/// Extract the category-specific fields of an engine payload.
pub fn normalize(
    identifier: &EventIdentifier,
    category: EventCategory,
    payload: &RawEvent,
) -> EmitCandidate {
    match category {
        EventCategory::Buffer => {
            let (Some(media_type), Some(level)) = (
                payload.str_field("mediaType"),
                payload.f64_field("bufferLevel"),
            ) else {
                return EmitCandidate::NoSample;
            };
            EmitCandidate::Emit(QlogEvent::BufferLevelUpdate {
                media_type: MediaType::from_label(media_type),
                level_ms: level * 1000.0,
                stream_id: stream_id(payload),
            })
        }
        EventCategory::Progress => {
            let Some(time) = payload.f64_field("time") else {
                return EmitCandidate::NoSample;
            };
            EmitCandidate::Emit(QlogEvent::PlayheadProgress {
                playhead_ms: time * 1000.0,
                time_to_end_ms: payload.f64_field("timeToEnd").map(|t| t * 1000.0),
                stream_id: stream_id(payload),
            })
        }
        EventCategory::Error => {
            let message = payload
                .str_field("type")
                .or_else(|| payload.str_field("message"))
                .unwrap_or(identifier.as_str());
            EmitCandidate::Emit(QlogEvent::engine_error(message))
        }
        EventCategory::Unclassified => {
            warn!(
                identifier = %identifier,
                event_type = payload.str_field("type").unwrap_or_default(),
                message = payload.str_field("message").unwrap_or_default(),
                "unclassified engine event"
            );
            EmitCandidate::NoSample
        }
        EventCategory::Ignored | EventCategory::Interaction => EmitCandidate::NoSample,
    }
}

fn stream_id(payload: &RawEvent) -> Option<StreamId> {
    payload.id_field("streamId").map(StreamId::from)
}

/// Network request hook: media type is inferred from the URL.
pub fn request_candidate(event: RequestEvent) -> EmitCandidate {
    match event {
        RequestEvent::Started { url } => {
            let media_type = MediaType::infer_from_url(&url);
            EmitCandidate::Emit(QlogEvent::RequestStarted { url, media_type })
        }
        RequestEvent::Completed { url, byte_length } => {
            EmitCandidate::Emit(QlogEvent::RequestUpdated { url, byte_length })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use vqlog_policy::ClassificationPolicy;
    use vqlog_protocol::{LifecycleState, LogWriter, QlogResult, SessionId};

    use super::*;
    use crate::lifecycle::SessionLifecycle;

    #[derive(Default)]
    struct VecWriter {
        events: parking_lot::Mutex<Vec<QlogEvent>>,
    }

    #[async_trait::async_trait]
    impl LogWriter for VecWriter {
        async fn init(&self, _session_id: &SessionId, _title: &str) -> QlogResult<()> {
            Ok(())
        }

        async fn record(&self, event: QlogEvent) -> QlogResult<()> {
            self.events.lock().push(event);
            Ok(())
        }

        async fn generate_blob(&self) -> QlogResult<String> {
            Ok(String::new())
        }
    }

    fn router(active: bool) -> (EventRouter, Arc<VecWriter>) {
        let lifecycle = Arc::new(SessionLifecycle::new());
        lifecycle.transition(LifecycleState::Initialising).unwrap();
        lifecycle.transition(LifecycleState::Initialised).unwrap();
        if active {
            lifecycle.activate().unwrap();
        }
        let writer = Arc::new(VecWriter::default());
        let table = ClassificationPolicy::dashjs()
            .classify(
                [
                    "bufferLevelUpdated",
                    "playbackTimeUpdated",
                    "playbackNotAllowed",
                    "metricsChanged",
                    "qualityChangeRendered",
                ]
                .into_iter()
                .map(EventIdentifier::from),
            )
            .unwrap();
        (
            EventRouter::new(table, Emitter::new(lifecycle, writer.clone())),
            writer,
        )
    }

    #[test]
    fn buffer_payload_is_converted_to_milliseconds() {
        let payload = RawEvent::from_value(json!({
            "mediaType": "audio",
            "bufferLevel": 9.8,
            "streamId": "period-0",
        }));
        let candidate = normalize(&"bufferLevelUpdated".into(), EventCategory::Buffer, &payload);
        assert_eq!(
            candidate,
            EmitCandidate::Emit(QlogEvent::BufferLevelUpdate {
                media_type: MediaType::Audio,
                level_ms: 9800.0,
                stream_id: Some("period-0".into()),
            })
        );
    }

    #[test]
    fn buffer_payload_without_level_is_no_sample() {
        let payload = RawEvent::new().with("mediaType", "video");
        assert_eq!(
            normalize(&"bufferStalled".into(), EventCategory::Buffer, &payload),
            EmitCandidate::NoSample
        );
    }

    #[test]
    fn progress_time_to_end_is_optional() {
        let payload = RawEvent::new().with("time", 3.5);
        assert_eq!(
            normalize(&"playbackTimeUpdated".into(), EventCategory::Progress, &payload),
            EmitCandidate::Emit(QlogEvent::PlayheadProgress {
                playhead_ms: 3500.0,
                time_to_end_ms: None,
                stream_id: None,
            })
        );
    }

    #[test]
    fn error_message_falls_back_to_identifier() {
        let typed = RawEvent::new().with("type", "playbackNotAllowed");
        assert_eq!(
            normalize(&"playbackNotAllowed".into(), EventCategory::Error, &typed),
            EmitCandidate::Emit(QlogEvent::engine_error("playbackNotAllowed"))
        );
        assert_eq!(
            normalize(&"customError".into(), EventCategory::Error, &RawEvent::new()),
            EmitCandidate::Emit(QlogEvent::engine_error("customError"))
        );
    }

    #[test]
    fn request_media_type_is_inferred() {
        assert_eq!(
            request_candidate(RequestEvent::Started {
                url: "https://cdn.example/audio/seg-3.m4s".to_owned()
            }),
            EmitCandidate::Emit(QlogEvent::RequestStarted {
                url: "https://cdn.example/audio/seg-3.m4s".to_owned(),
                media_type: MediaType::Audio,
            })
        );
    }

    #[tokio::test]
    async fn inactive_router_writes_nothing() {
        let (router, writer) = router(false);
        let payload = RawEvent::new().with("mediaType", "video").with("bufferLevel", 1.0);
        assert!(!router.route(&"bufferLevelUpdated".into(), payload).await);
        assert!(
            !router
                .route(
                    &"playbackNotAllowed".into(),
                    RawEvent::new().with("type", "playbackNotAllowed")
                )
                .await
        );
        assert!(writer.events.lock().is_empty());
    }

    #[tokio::test]
    async fn unclassified_events_never_write() {
        let (router, writer) = router(true);
        let payload = RawEvent::new().with("type", "qualityChangeRendered");
        assert!(!router.route(&"qualityChangeRendered".into(), payload).await);
        assert!(writer.events.lock().is_empty());
        assert_eq!(
            router.table().get(&"qualityChangeRendered".into()),
            Some(EventCategory::Unclassified)
        );
    }

    #[tokio::test]
    async fn active_router_forwards_buffer_events_without_dedup() {
        let (router, writer) = router(true);
        for _ in 0..2 {
            let payload = RawEvent::new().with("mediaType", "video").with("bufferLevel", 12.0);
            assert!(router.route(&"bufferLevelUpdated".into(), payload).await);
        }
        assert_eq!(writer.events.lock().len(), 2);
    }
}
