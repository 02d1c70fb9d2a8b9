use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use vqlog_policy::{ClassificationPolicy, ClassificationTable};
use vqlog_protocol::{
    ElementEvent, EventIdentifier, Exporter, LifecycleState, LogWriter, Manifest, MediaElement,
    MediaEngine, QlogError, QlogEvent, QlogResult, RawEvent, RequestEvent, SessionId, StatusColor,
    StatusDisplay,
};

use crate::dedup::DedupCache;
use crate::element::ElementRouter;
use crate::emit::{EmitCandidate, Emitter};
use crate::lifecycle::SessionLifecycle;
use crate::poller::{DecodedBytesPoller, MetricsPoller, PollingScheduler};
use crate::router::{EventRouter, request_candidate};
use crate::status::{STATUS_KEY, lifecycle_status};

pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DECODED_BYTES_INTERVAL: Duration = Duration::from_millis(5000);
pub const MANIFEST_EXPORT_NAME: &str = "manifest.json";
pub const LOG_EXPORT_NAME: &str = "dashjs.qlog";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub autoplay: bool,
    pub autosave: bool,
    pub metrics_interval: Duration,
    pub decoded_bytes_interval: Duration,
    pub manifest_export_name: String,
    pub log_export_name: String,
    pub title: String,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            autoplay: false,
            autosave: false,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
            decoded_bytes_interval: DEFAULT_DECODED_BYTES_INTERVAL,
            manifest_export_name: MANIFEST_EXPORT_NAME.to_owned(),
            log_export_name: LOG_EXPORT_NAME.to_owned(),
            title: "dash.js qlog".to_owned(),
        }
    }
}

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct SessionPorts {
    pub engine: Arc<dyn MediaEngine>,
    pub element: Arc<dyn MediaElement>,
    pub writer: Arc<dyn LogWriter>,
    pub exporter: Arc<dyn Exporter>,
    pub status: Arc<dyn StatusDisplay>,
}

struct SessionCore {
    session_id: SessionId,
    config: SessionConfig,
    policy: ClassificationPolicy,
    ports: SessionPorts,
    lifecycle: Arc<SessionLifecycle>,
    emitter: Emitter,
    cache: Arc<Mutex<DedupCache>>,
    scheduler: PollingScheduler,
    element_router: ElementRouter,
    router: Mutex<Option<EventRouter>>,
    manifest: Mutex<Option<Manifest>>,
}

impl SessionCore {
    fn publish_lifecycle_status(&self) {
        let (value, color) = lifecycle_status(self.lifecycle.state());
        self.ports.status.set_status(STATUS_KEY, value, color);
    }

    /// Best-effort error fact, then the error the setup call returns.
    async fn fail_setup(&self, message: String) -> QlogError {
        if let Err(error) = self
            .emitter
            .record_ungated(QlogEvent::engine_error(message.clone()))
            .await
        {
            warn!(error = %error, "could not record setup failure");
        }
        QlogError::SetupFailure(message)
    }

    async fn stop_logging(&self) -> bool {
        if !self.lifecycle.deactivate() {
            return false;
        }
        self.scheduler.stop().await;
        self.publish_lifecycle_status();
        true
    }

    async fn download_current_log(&self) -> Result<()> {
        let blob = self
            .ports
            .writer
            .generate_blob()
            .await
            .context("failed generating log blob")?;
        self.ports
            .exporter
            .export(&self.config.log_export_name, &blob)
            .await
            .context("failed exporting log")?;
        info!(filename = %self.config.log_export_name, "log downloaded");
        Ok(())
    }

    async fn export_manifest(&self, manifest: &Manifest) -> Result<()> {
        let data = serde_json::to_string(&manifest.document)
            .context("failed serializing manifest")?;
        self.ports
            .exporter
            .export(&self.config.manifest_export_name, &data)
            .await
            .context("failed exporting manifest")?;
        Ok(())
    }

    /// Record the end of playback and stop logging when active, then autosave.
    async fn handle_playback_ended(&self) -> Result<()> {
        if self.lifecycle.is_active() {
            let playhead_ms = self.ports.element.current_time() * 1000.0;
            self.emitter
                .emit(EmitCandidate::Emit(QlogEvent::PlaybackEnded { playhead_ms }))
                .await;
            self.stop_logging().await;
            info!(playhead_ms, "playback ended");
        }
        if self.config.autosave {
            self.download_current_log().await?;
        }
        Ok(())
    }
}

/// One logging session over a media engine and its element.
pub struct QlogSession {
    core: Arc<SessionCore>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl QlogSession {
    pub fn new(config: SessionConfig, policy: ClassificationPolicy, ports: SessionPorts) -> Self {
        let lifecycle = Arc::new(SessionLifecycle::new());
        let emitter = Emitter::new(lifecycle.clone(), ports.writer.clone());
        let cache = Arc::new(Mutex::new(DedupCache::new()));
        let scheduler = PollingScheduler::new(
            MetricsPoller::new(
                ports.engine.clone(),
                ports.element.clone(),
                cache.clone(),
                emitter.clone(),
                ports.status.clone(),
            ),
            DecodedBytesPoller::new(
                ports.element.clone(),
                cache.clone(),
                emitter.clone(),
                ports.status.clone(),
                config.decoded_bytes_interval,
            ),
            config.metrics_interval,
        );
        let element_router = ElementRouter::new(ports.element.clone(), emitter.clone());
        let core = SessionCore {
            session_id: SessionId::new_uuid(),
            config,
            policy,
            ports,
            lifecycle,
            emitter,
            cache,
            scheduler,
            element_router,
            router: Mutex::new(None),
            manifest: Mutex::new(None),
        };
        core.publish_lifecycle_status();
        Self {
            core: Arc::new(core),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.core.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub fn state(&self) -> LifecycleState {
        self.core.lifecycle.state()
    }

    pub fn is_active(&self) -> bool {
        self.core.lifecycle.is_active()
    }

    /// Classification built during setup.
    pub fn classification(&self) -> Option<ClassificationTable> {
        self.core
            .router
            .lock()
            .as_ref()
            .map(|router| router.table().clone())
    }

    pub fn manifest(&self) -> Option<Manifest> {
        self.core.manifest.lock().clone()
    }

    pub fn dedup_cache(&self) -> DedupCache {
        self.core.cache.lock().clone()
    }

    pub fn running_pollers(&self) -> Vec<&'static str> {
        self.core.scheduler.running()
    }

    fn spawn_listener(&self, task: JoinHandle<()>) {
        self.listeners.lock().push(task);
    }

    /// Classify engine events, retrieve and attach the manifest, and wire listeners.
    ///
    /// Fails with `InvalidTransition` when called twice and with
    /// `SetupFailure` when the manifest cannot be used. A failed session
    /// stays `Initialising`.
    #[instrument(
        skip(self),
        fields(session_id = %self.core.session_id, url = %self.core.config.url)
    )]
    pub async fn setup(&self) -> Result<()> {
        let core = &self.core;
        core.lifecycle.transition(LifecycleState::Initialising)?;
        core.publish_lifecycle_status();

        if let Err(error) = self.run_setup().await {
            warn!(error = %error, "session setup failed");
            core.ports
                .status
                .set_status(STATUS_KEY, "failed", StatusColor::Red);
            return Err(error.into());
        }

        core.lifecycle.transition(LifecycleState::Initialised)?;
        core.publish_lifecycle_status();
        info!("session initialised");
        Ok(())
    }

    async fn run_setup(&self) -> QlogResult<()> {
        let core = &self.core;
        core.ports
            .writer
            .init(&core.session_id, &core.config.title)
            .await
            .map_err(|error| QlogError::SetupFailure(format!("log writer init: {error}")))?;

        let table = core
            .policy
            .classify(core.ports.engine.event_identifiers())
            .map_err(|error| QlogError::SetupFailure(error.to_string()))?;
        let summary = table.summary();
        info!(
            buffer = summary.buffer,
            progress = summary.progress,
            error = summary.error,
            ignored = summary.ignored,
            unclassified = summary.unclassified,
            "engine events classified"
        );
        self.wire_engine(EventRouter::new(table, core.emitter.clone()));

        let manifest = match core.ports.engine.retrieve_manifest(&core.config.url).await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return Err(core.fail_setup("no metadata".to_owned()).await),
            Err(error) => return Err(core.fail_setup(error.to_string()).await),
        };

        if let Err(error) = core
            .ports
            .engine
            .attach_source(&manifest, core.config.autoplay)
        {
            return Err(core.fail_setup(format!("attach source: {error}")).await);
        }

        let stream_initialised = QlogEvent::StreamInitialised {
            url: core.config.url.clone(),
            autoplay: core.config.autoplay,
            manifest_name: core.config.manifest_export_name.clone(),
        };
        let readystate = QlogEvent::ReadystateChanged {
            state: core.ports.element.ready_state(),
        };
        for fact in [stream_initialised, readystate] {
            core.emitter
                .record_ungated(fact)
                .await
                .map_err(|error| {
                    QlogError::SetupFailure(format!("stream initialisation: {error}"))
                })?;
        }

        if core.config.autosave
            && let Err(error) = core.export_manifest(&manifest).await
        {
            warn!(error = %error, "manifest autosave failed");
        }
        *core.manifest.lock() = Some(manifest);

        self.wire_element();
        Ok(())
    }

    fn wire_engine(&self, router: EventRouter) {
        let engine = self.core.ports.engine.clone();

        let mut events = router.subscribe_all(engine.as_ref());
        let events_router = router.clone();
        self.spawn_listener(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                events_router.dispatch_routed(event).await;
            }
            debug!("engine event stream closed");
        }));

        let mut requests = engine.request_events();
        let emitter = self.core.emitter.clone();
        self.spawn_listener(tokio::spawn(async move {
            while let Some(request) = requests.next().await {
                if emitter.is_open() {
                    emitter.emit(request_candidate(request)).await;
                }
            }
        }));

        let mut ended = engine.subscribe(&self.core.policy.playback_ended);
        let core = Arc::clone(&self.core);
        self.spawn_listener(tokio::spawn(async move {
            while ended.next().await.is_some() {
                if let Err(error) = core.handle_playback_ended().await {
                    warn!(error = %error, "playback end handling failed");
                }
            }
        }));

        *self.core.router.lock() = Some(router);
    }

    fn wire_element(&self) {
        let mut events = self.core.ports.element.events();
        let element_router = self.core.element_router.clone();
        self.spawn_listener(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                element_router.dispatch(event).await;
            }
        }));
    }

    /// Open the gate and start the pollers. A no-op while already logging.
    #[instrument(skip(self), fields(session_id = %self.core.session_id))]
    pub async fn start_logging(&self) -> Result<()> {
        if !self.core.lifecycle.activate()? {
            debug!("already logging");
            return Ok(());
        }
        self.core.scheduler.start();
        self.core.publish_lifecycle_status();
        Ok(())
    }

    /// Close the gate and cancel the pollers. A no-op unless logging.
    #[instrument(skip(self), fields(session_id = %self.core.session_id))]
    pub async fn stop_logging(&self) {
        if !self.core.stop_logging().await {
            debug!("not logging");
        }
    }

    #[instrument(skip(self), fields(session_id = %self.core.session_id))]
    pub async fn download_current_log(&self) -> Result<()> {
        self.core.download_current_log().await
    }

    /// Export the retained manifest; logs an error when there is none.
    #[instrument(skip(self), fields(session_id = %self.core.session_id))]
    pub async fn download_manifest(&self) -> Result<()> {
        let Some(manifest) = self.manifest() else {
            error!("manifest not available");
            return Ok(());
        };
        self.core.export_manifest(&manifest).await
    }

    pub async fn handle_playback_ended(&self) -> Result<()> {
        self.core.handle_playback_ended().await
    }

    /// Route one engine event through the session's classification table.
    pub async fn handle_engine_event(
        &self,
        identifier: &EventIdentifier,
        payload: RawEvent,
    ) -> bool {
        let router = self.core.router.lock().clone();
        match router {
            Some(router) => router.route(identifier, payload).await,
            None => false,
        }
    }

    pub async fn handle_element_event(&self, event: ElementEvent) -> bool {
        self.core.element_router.dispatch(event).await
    }

    pub async fn handle_request_event(&self, event: RequestEvent) -> bool {
        if !self.core.emitter.is_open() {
            return false;
        }
        self.core.emitter.emit(request_candidate(event)).await
    }

    pub async fn poll_metrics_once(&self) -> usize {
        self.core.scheduler.metrics().tick().await
    }

    pub async fn poll_decoded_bytes_once(&self) -> Option<f64> {
        self.core.scheduler.decoded().tick().await
    }
}

impl Drop for QlogSession {
    fn drop(&mut self) {
        for task in self.listeners.lock().drain(..) {
            task.abort();
        }
        self.core.scheduler.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use anyhow::Result;
    use serde_json::json;
    use tokio::fs;
    use vqlog_events::{FileExporter, MemoryQlogStore, QlogJournal, QlogStreamHub};
    use vqlog_protocol::{EventCategory, InteractionState, MediaType, ReadyState};
    use vqlog_sim::{ScriptedElement, ScriptedEngine};

    use super::*;
    use crate::status::{BUFFER_LEVEL_VIDEO_KEY, StatusBoard};

    fn unique_test_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    struct Harness {
        root: PathBuf,
        engine: Arc<ScriptedEngine>,
        element: Arc<ScriptedElement>,
        store: Arc<MemoryQlogStore>,
        status: Arc<StatusBoard>,
        session: QlogSession,
    }

    impl Harness {
        fn new(name: &str, configure: impl FnOnce(&mut SessionConfig)) -> Self {
            let root = unique_test_root(name);
            let engine = Arc::new(ScriptedEngine::dashjs());
            engine.set_manifest(json!({ "type": "static", "periods": 1 }));
            let element = Arc::new(ScriptedElement::new());
            let store = Arc::new(MemoryQlogStore::new());
            let status = Arc::new(StatusBoard::new());
            let mut config = SessionConfig::new("https://cdn.example/stream/manifest.mpd");
            // ticks are driven by hand
            config.metrics_interval = Duration::from_secs(3600);
            configure(&mut config);
            let session = QlogSession::new(
                config,
                ClassificationPolicy::dashjs(),
                SessionPorts {
                    engine: engine.clone(),
                    element: element.clone(),
                    writer: Arc::new(QlogJournal::new(store.clone(), QlogStreamHub::new(64))),
                    exporter: Arc::new(FileExporter::new(root.join("exports"))),
                    status: status.clone(),
                },
            );
            Self {
                root,
                engine,
                element,
                store,
                status,
                session,
            }
        }

        fn events(&self) -> Vec<QlogEvent> {
            self.store
                .records(self.session.session_id())
                .into_iter()
                .map(|record| record.event)
                .collect()
        }

        fn count(&self, predicate: impl Fn(&QlogEvent) -> bool) -> usize {
            self.events().iter().filter(|event| predicate(event)).count()
        }

        async fn cleanup(self) {
            let _ = fs::remove_dir_all(&self.root).await;
        }
    }

    fn is_video_level(event: &QlogEvent) -> bool {
        matches!(
            event,
            QlogEvent::BufferLevelUpdate {
                media_type: MediaType::Video,
                ..
            }
        )
    }

    #[tokio::test]
    async fn setup_records_stream_facts_and_classifies() -> Result<()> {
        let harness = Harness::new("vqlog-session-setup", |_| {});
        harness.element.set_ready_state(ReadyState::HaveMetadata);
        harness.session.setup().await?;

        assert_eq!(harness.session.state(), LifecycleState::Initialised);
        assert_eq!(
            harness.events(),
            vec![
                QlogEvent::StreamInitialised {
                    url: "https://cdn.example/stream/manifest.mpd".to_owned(),
                    autoplay: false,
                    manifest_name: "manifest.json".to_owned(),
                },
                QlogEvent::ReadystateChanged {
                    state: ReadyState::HaveMetadata
                },
            ]
        );
        let table = harness.session.classification().expect("classified");
        assert_eq!(table.len(), harness.engine.identifier_count());
        assert_eq!(
            table.get(&"qualityChangeRendered".into()),
            Some(EventCategory::Unclassified)
        );
        assert_eq!(
            harness.status.value(STATUS_KEY).as_deref(),
            Some("initialised")
        );
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn manifest_error_fails_setup_once() -> Result<()> {
        let harness = Harness::new("vqlog-session-fail", |_| {});
        harness.engine.fail_manifest("404 Not Found");

        let err = harness.session.setup().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QlogError>(),
            Some(QlogError::SetupFailure(message)) if message == "404 Not Found"
        ));
        assert_eq!(harness.session.state(), LifecycleState::Initialising);
        assert_eq!(harness.events(), vec![QlogEvent::engine_error("404 Not Found")]);
        assert_eq!(
            harness.status.get(STATUS_KEY),
            Some(("failed".to_owned(), StatusColor::Red))
        );

        let retry = harness.session.setup().await.unwrap_err();
        assert!(matches!(
            retry.downcast_ref::<QlogError>(),
            Some(QlogError::InvalidTransition { .. })
        ));
        assert!(harness.session.start_logging().await.is_err());
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn missing_manifest_reports_no_metadata() -> Result<()> {
        let harness = Harness::new("vqlog-session-null", |_| {});
        harness.engine.clear_manifest();
        assert!(harness.session.setup().await.is_err());
        assert_eq!(harness.events(), vec![QlogEvent::engine_error("no metadata")]);
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn handlers_are_gated_until_logging_starts() -> Result<()> {
        let harness = Harness::new("vqlog-session-gate", |_| {});
        harness.session.setup().await?;
        harness.engine.set_active_stream("period-0", 0);
        let before = harness.events().len();

        let buffer = RawEvent::new().with("mediaType", "video").with("bufferLevel", 2.0);
        assert!(
            !harness
                .session
                .handle_engine_event(&"bufferLevelUpdated".into(), buffer.clone())
                .await
        );
        assert!(!harness.session.handle_element_event(ElementEvent::Play).await);
        assert!(
            !harness
                .session
                .handle_request_event(RequestEvent::Started {
                    url: "https://cdn.example/video/1.m4s".to_owned()
                })
                .await
        );
        assert_eq!(harness.session.poll_metrics_once().await, 0);
        assert_eq!(harness.events().len(), before);

        harness.session.start_logging().await?;
        assert!(
            harness
                .session
                .handle_engine_event(&"bufferLevelUpdated".into(), buffer)
                .await
        );
        assert!(harness.session.handle_element_event(ElementEvent::Play).await);
        assert_eq!(
            harness.events().last(),
            Some(&QlogEvent::PlayerInteraction {
                state: InteractionState::Play,
                playhead_ms: 0.0,
                playback_rate: 1.0,
                volume: 1.0,
            })
        );

        harness.session.stop_logging().await;
        let after_stop = harness.events().len();
        assert!(!harness.session.handle_element_event(ElementEvent::Pause).await);
        assert_eq!(harness.events().len(), after_stop);
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn buffer_level_scenario_emits_one_change() -> Result<()> {
        let harness = Harness::new("vqlog-session-levels", |_| {});
        harness.session.setup().await?;
        harness.session.start_logging().await?;
        harness.engine.set_active_stream("period-0", 0);

        for level in [12.0, 12.0, 12.0, 11.3] {
            harness.engine.set_buffer_level(MediaType::Video, level);
            harness.session.poll_metrics_once().await;
        }

        let levels: Vec<_> = harness
            .events()
            .into_iter()
            .filter(is_video_level)
            .collect();
        assert_eq!(
            levels,
            vec![
                QlogEvent::BufferLevelUpdate {
                    media_type: MediaType::Video,
                    level_ms: 12000.0,
                    stream_id: None
                },
                QlogEvent::BufferLevelUpdate {
                    media_type: MediaType::Video,
                    level_ms: 11300.0,
                    stream_id: None
                },
            ]
        );
        assert_eq!(
            harness.status.value(BUFFER_LEVEL_VIDEO_KEY).as_deref(),
            Some("11.3 s")
        );
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn resume_keeps_dedup_cache() -> Result<()> {
        let harness = Harness::new("vqlog-session-resume", |_| {});
        harness.session.setup().await?;
        harness.session.start_logging().await?;
        harness.engine.set_active_stream("period-0", 0);
        harness.engine.set_buffer_level(MediaType::Video, 11.3);
        harness.session.poll_metrics_once().await;
        assert_eq!(harness.count(is_video_level), 1);

        harness.session.stop_logging().await;
        assert_eq!(harness.session.state(), LifecycleState::Stopped);
        harness.session.start_logging().await?;
        assert_eq!(harness.session.state(), LifecycleState::Active);

        assert_eq!(harness.session.poll_metrics_once().await, 0);
        assert_eq!(harness.count(is_video_level), 1);

        harness.engine.set_buffer_level(MediaType::Video, 9.8);
        assert_eq!(harness.session.poll_metrics_once().await, 1);
        assert_eq!(harness.count(is_video_level), 2);
        assert_eq!(
            harness.session.dedup_cache().last_buffer_level(MediaType::Video),
            Some(9.8)
        );
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() -> Result<()> {
        let harness = Harness::new("vqlog-session-idem", |_| {});
        harness.session.stop_logging().await;
        harness.session.setup().await?;
        harness.session.start_logging().await?;
        harness.session.start_logging().await?;
        assert_eq!(harness.session.running_pollers(), vec!["metrics"]);
        harness.session.stop_logging().await;
        harness.session.stop_logging().await;
        assert!(harness.session.running_pollers().is_empty());
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn playback_end_stops_and_autosaves() -> Result<()> {
        let harness = Harness::new("vqlog-session-ended", |config| config.autosave = true);
        harness.element.set_decoded_byte_count(0);
        harness.session.setup().await?;
        let manifest = fs::read_to_string(harness.root.join("exports").join("manifest.json")).await?;
        assert!(manifest.contains("static"));

        harness.session.start_logging().await?;
        assert_eq!(
            harness.session.running_pollers(),
            vec!["metrics", "decoded_bytes"]
        );
        harness.element.set_current_time(42.0);
        harness.session.handle_playback_ended().await?;

        assert_eq!(harness.session.state(), LifecycleState::Stopped);
        assert!(harness.session.running_pollers().is_empty());
        assert_eq!(
            harness.events().last(),
            Some(&QlogEvent::PlaybackEnded {
                playhead_ms: 42000.0
            })
        );
        let blob = fs::read_to_string(harness.root.join("exports").join("dashjs.qlog")).await?;
        let document: serde_json::Value = serde_json::from_str(&blob)?;
        assert_eq!(document["title"], "dash.js qlog");

        harness.session.handle_playback_ended().await?;
        assert_eq!(harness.count(|e| matches!(e, QlogEvent::PlaybackEnded { .. })), 1);
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn playback_end_after_stop_still_autosaves() -> Result<()> {
        let harness = Harness::new("vqlog-session-ended-stopped", |config| {
            config.autosave = true
        });
        harness.session.setup().await?;
        harness.session.start_logging().await?;
        harness.session.stop_logging().await;

        harness.session.handle_playback_ended().await?;

        assert_eq!(harness.session.state(), LifecycleState::Stopped);
        assert_eq!(harness.count(|e| matches!(e, QlogEvent::PlaybackEnded { .. })), 0);
        let blob = fs::read_to_string(harness.root.join("exports").join("dashjs.qlog")).await?;
        let document: serde_json::Value = serde_json::from_str(&blob)?;
        assert_eq!(document["traces"][0]["events"].as_array().map(Vec::len), Some(2));
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn engine_listeners_route_pushed_events() -> Result<()> {
        let harness = Harness::new("vqlog-session-push", |_| {});
        harness.session.setup().await?;
        harness.session.start_logging().await?;

        harness.engine.emit(
            "playbackNotAllowed",
            RawEvent::new().with("type", "playbackNotAllowed"),
        );
        harness.engine.emit(
            "qualityChangeRendered",
            RawEvent::new().with("type", "qualityChangeRendered"),
        );
        harness.engine.request(RequestEvent::Completed {
            url: "https://cdn.example/video/1.m4s".to_owned(),
            byte_length: 2048,
        });
        harness.element.dispatch(ElementEvent::Stalled);

        let mut attempts = 0;
        while harness.events().len() < 5 && attempts < 100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            attempts += 1;
        }
        let events = harness.events();
        assert!(events.contains(&QlogEvent::engine_error("playbackNotAllowed")));
        assert!(events.contains(&QlogEvent::RequestUpdated {
            url: "https://cdn.example/video/1.m4s".to_owned(),
            byte_length: 2048,
        }));
        assert!(events.contains(&QlogEvent::Rebuffer { playhead_ms: 0.0 }));
        assert!(!events.iter().any(|event| matches!(
            event,
            QlogEvent::Error { message, .. } if message == "qualityChangeRendered"
        )));

        harness.engine.emit("playbackEnded", RawEvent::new());
        let mut attempts = 0;
        while harness.session.state() != LifecycleState::Stopped && attempts < 100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            attempts += 1;
        }
        assert_eq!(harness.session.state(), LifecycleState::Stopped);
        harness.cleanup().await;
        Ok(())
    }

    #[tokio::test]
    async fn download_manifest_without_manifest_is_a_no_op() -> Result<()> {
        let harness = Harness::new("vqlog-session-nomanifest", |_| {});
        harness.session.download_manifest().await?;
        assert!(!fs::try_exists(harness.root.join("exports")).await?);
        harness.cleanup().await;
        Ok(())
    }
}
