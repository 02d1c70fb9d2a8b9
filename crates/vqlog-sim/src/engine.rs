use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::future::ready;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use vqlog_protocol::{
    Adaptation, EngineEventStream, EventIdentifier, Manifest, MediaEngine, MediaType, QlogError,
    QlogResult, RawEvent, Representation, RepresentationId, RepresentationSwitch, RequestEvent,
    RequestEventStream, StreamId, StreamInfo,
};

const CHANNEL_CAPACITY: usize = 256;

/// Event identifiers of the dash.js `MediaPlayer.events` surface.
pub const DASHJS_EVENT_IDENTIFIERS: &[&str] = &[
    "astInFuture",
    "bufferStalled",
    "bufferLoaded",
    "bufferStateChanged",
    "bufferLevelUpdated",
    "dynamicToStatic",
    "error",
    "fragmentLoadingCompleted",
    "fragmentLoadingProgress",
    "fragmentLoadingStarted",
    "fragmentLoadingAbandoned",
    "log",
    "manifestLoaded",
    "metricsChanged",
    "metricChanged",
    "metricAdded",
    "metricUpdated",
    "periodSwitchStarted",
    "periodSwitchCompleted",
    "qualityChangeRequested",
    "qualityChangeRendered",
    "trackChangeRendered",
    "streamInitializing",
    "streamUpdated",
    "streamActivated",
    "streamDeactivated",
    "streamInitialized",
    "streamTeardownComplete",
    "allTextTracksAdded",
    "textTrackAdded",
    "canPlay",
    "canPlayThrough",
    "playbackEnded",
    "playbackError",
    "playbackNotAllowed",
    "playbackMetaDataLoaded",
    "playbackLoadedData",
    "playbackPaused",
    "playbackPlaying",
    "playbackProgress",
    "playbackRateChanged",
    "playbackSeeked",
    "playbackSeeking",
    "playbackStalled",
    "playbackStarted",
    "playbackTimeUpdated",
    "playbackVolumeChanged",
    "playbackWaiting",
    "manifestValidityChanged",
    "representationSwitch",
];

#[derive(Debug, Clone)]
enum ManifestOutcome {
    Ready(Value),
    Missing,
    Failed(String),
}

#[derive(Debug)]
struct EngineState {
    manifest: ManifestOutcome,
    attached: Option<(String, bool)>,
    active_stream: Option<StreamInfo>,
    switch_target: Option<RepresentationId>,
    video_representations: Vec<Representation>,
    buffer_levels: HashMap<MediaType, f64>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            manifest: ManifestOutcome::Ready(json!({ "type": "static" })),
            attached: None,
            active_stream: None,
            switch_target: None,
            video_representations: Vec::new(),
            buffer_levels: HashMap::new(),
        }
    }
}

/// In-process media engine whose events and metrics are set by the caller.
pub struct ScriptedEngine {
    identifiers: Vec<EventIdentifier>,
    channels: HashMap<EventIdentifier, broadcast::Sender<RawEvent>>,
    requests: broadcast::Sender<RequestEvent>,
    state: Mutex<EngineState>,
}

impl ScriptedEngine {
    pub fn with_identifiers<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EventIdentifier>,
    {
        let identifiers: Vec<EventIdentifier> = identifiers.into_iter().map(Into::into).collect();
        let channels = identifiers
            .iter()
            .map(|identifier| {
                let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
                (identifier.clone(), sender)
            })
            .collect();
        let (requests, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            identifiers,
            channels,
            requests,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Engine exposing the full dash.js event surface.
    pub fn dashjs() -> Self {
        Self::with_identifiers(DASHJS_EVENT_IDENTIFIERS.iter().copied())
    }

    pub fn identifier_count(&self) -> usize {
        self.identifiers.len()
    }

    pub fn set_manifest(&self, document: Value) {
        self.state.lock().manifest = ManifestOutcome::Ready(document);
    }

    /// Retrieval completes without data.
    pub fn clear_manifest(&self) {
        self.state.lock().manifest = ManifestOutcome::Missing;
    }

    pub fn fail_manifest(&self, message: impl Into<String>) {
        self.state.lock().manifest = ManifestOutcome::Failed(message.into());
    }

    pub fn attached_source(&self) -> Option<(String, bool)> {
        self.state.lock().attached.clone()
    }

    pub fn set_active_stream(&self, id: impl Into<StreamId>, index: usize) {
        self.state.lock().active_stream = Some(StreamInfo {
            id: id.into(),
            index,
        });
    }

    pub fn clear_active_stream(&self) {
        self.state.lock().active_stream = None;
    }

    /// Seconds buffered ahead for `media_type`.
    pub fn set_buffer_level(&self, media_type: MediaType, seconds: f64) {
        self.state.lock().buffer_levels.insert(media_type, seconds);
    }

    /// `(id, bandwidth bps, frame rate)` for each video representation.
    pub fn set_video_representations(&self, representations: &[(&str, u64, Option<f64>)]) {
        self.state.lock().video_representations = representations
            .iter()
            .map(|(id, bandwidth, frame_rate)| Representation {
                id: RepresentationId::from(*id),
                bandwidth: *bandwidth,
                frame_rate: *frame_rate,
            })
            .collect();
    }

    pub fn switch_representation(&self, id: impl Into<RepresentationId>) {
        self.state.lock().switch_target = Some(id.into());
    }

    /// Push `payload` to subscribers of `identifier`; returns how many received it.
    pub fn emit(&self, identifier: impl Into<EventIdentifier>, payload: RawEvent) -> usize {
        let identifier = identifier.into();
        let Some(sender) = self.channels.get(&identifier) else {
            debug!(identifier = %identifier, "scripted engine has no such event");
            return 0;
        };
        sender.send(payload).unwrap_or(0)
    }

    pub fn request(&self, event: RequestEvent) -> usize {
        self.requests.send(event).unwrap_or(0)
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::dashjs()
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    fn event_identifiers(&self) -> Vec<EventIdentifier> {
        self.identifiers.clone()
    }

    fn subscribe(&self, identifier: &EventIdentifier) -> EngineEventStream {
        match self.channels.get(identifier) {
            Some(sender) => BroadcastStream::new(sender.subscribe())
                .filter_map(|item| ready(item.ok()))
                .boxed(),
            None => stream::empty().boxed(),
        }
    }

    fn request_events(&self) -> RequestEventStream {
        BroadcastStream::new(self.requests.subscribe())
            .filter_map(|item| ready(item.ok()))
            .boxed()
    }

    async fn retrieve_manifest(&self, url: &str) -> QlogResult<Option<Manifest>> {
        let outcome = self.state.lock().manifest.clone();
        match outcome {
            ManifestOutcome::Ready(document) => Ok(Some(Manifest {
                url: url.to_owned(),
                document,
            })),
            ManifestOutcome::Missing => Ok(None),
            ManifestOutcome::Failed(message) => Err(QlogError::Engine(message)),
        }
    }

    fn attach_source(&self, manifest: &Manifest, autoplay: bool) -> QlogResult<()> {
        self.state.lock().attached = Some((manifest.url.clone(), autoplay));
        Ok(())
    }

    fn active_stream(&self) -> Option<StreamInfo> {
        self.state.lock().active_stream.clone()
    }

    fn current_representation_switch(
        &self,
        media_type: MediaType,
    ) -> Option<RepresentationSwitch> {
        if media_type != MediaType::Video {
            return None;
        }
        self.state
            .lock()
            .switch_target
            .clone()
            .map(|to| RepresentationSwitch { to })
    }

    fn adaptation_for(&self, _stream: &StreamInfo, media_type: MediaType) -> Option<Adaptation> {
        (media_type == MediaType::Video).then(|| Adaptation {
            representations: self.state.lock().video_representations.clone(),
        })
    }

    fn bandwidth_for_representation(
        &self,
        representation_id: &RepresentationId,
        _period_index: usize,
    ) -> Option<u64> {
        self.state
            .lock()
            .video_representations
            .iter()
            .find(|rep| rep.id == *representation_id)
            .map(|rep| rep.bandwidth)
    }

    fn current_buffer_level(&self, media_type: MediaType) -> f64 {
        self.state
            .lock()
            .buffer_levels
            .get(&media_type)
            .copied()
            .unwrap_or(0.0)
    }
}
