use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::instrument;
use vqlog_events::{FileExporter, FileQlogStore, QlogJournal, QlogStore, QlogStreamHub};
use vqlog_policy::{ClassificationPolicy, ClassificationTable};
use vqlog_protocol::{
    LifecycleState, MediaElement, MediaEngine, QlogRecord, SessionId, StatusDisplay,
};
use vqlog_runtime::{QlogSession, SessionConfig, SessionPorts, TracingStatusDisplay};

#[derive(Clone)]
pub struct PlayerBuilder {
    root: PathBuf,
    config: SessionConfig,
    policy: ClassificationPolicy,
    status: Arc<dyn StatusDisplay>,
    stream_capacity: usize,
}

impl PlayerBuilder {
    pub fn new(root: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            config: SessionConfig::new(url),
            policy: ClassificationPolicy::dashjs(),
            status: Arc::new(TracingStatusDisplay),
            stream_capacity: 1024,
        }
    }

    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.config.autoplay = autoplay;
        self
    }

    pub fn autosave(mut self, autosave: bool) -> Self {
        self.config.autosave = autosave;
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.config.metrics_interval = interval;
        self
    }

    pub fn decoded_bytes_interval(mut self, interval: Duration) -> Self {
        self.config.decoded_bytes_interval = interval;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn policy(mut self, policy: ClassificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn status_display(mut self, status: Arc<dyn StatusDisplay>) -> Self {
        self.status = status;
        self
    }

    pub fn stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    pub fn build(self, engine: Arc<dyn MediaEngine>, element: Arc<dyn MediaElement>) -> QlogPlayer {
        let store = Arc::new(FileQlogStore::new(&self.root));
        let journal = QlogJournal::new(store.clone(), QlogStreamHub::new(self.stream_capacity));
        let exporter = Arc::new(FileExporter::new(self.root.join("exports")));

        let session = QlogSession::new(
            self.config,
            self.policy,
            SessionPorts {
                engine,
                element,
                writer: Arc::new(journal.clone()),
                exporter,
                status: self.status,
            },
        );

        QlogPlayer {
            root: self.root,
            store,
            journal,
            session: Arc::new(session),
        }
    }
}

/// A logging session over a file-backed qlog journal.
#[derive(Clone)]
pub struct QlogPlayer {
    root: PathBuf,
    store: Arc<FileQlogStore>,
    journal: QlogJournal,
    session: Arc<QlogSession>,
}

impl QlogPlayer {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    pub fn log_path(&self) -> PathBuf {
        self.store.file_path(self.session.session_id())
    }

    pub fn session(&self) -> &QlogSession {
        &self.session
    }

    pub fn session_id(&self) -> &SessionId {
        self.session.session_id()
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state()
    }

    pub fn classification(&self) -> Option<ClassificationTable> {
        self.session.classification()
    }

    #[instrument(skip(self), fields(session_id = %self.session_id()))]
    pub async fn setup(&self) -> Result<()> {
        self.session.setup().await
    }

    pub async fn start_logging(&self) -> Result<()> {
        self.session.start_logging().await
    }

    pub async fn stop_logging(&self) {
        self.session.stop_logging().await;
    }

    pub async fn download_current_log(&self) -> Result<()> {
        self.session.download_current_log().await
    }

    pub async fn download_manifest(&self) -> Result<()> {
        self.session.download_manifest().await
    }

    /// Delete every stored log under the root; the session keeps logging.
    pub async fn wipe_logs(&self) -> Result<()> {
        self.journal.wipe().await
    }

    pub fn subscribe_records(&self) -> tokio::sync::broadcast::Receiver<QlogRecord> {
        self.journal.subscribe()
    }

    pub async fn read_records(&self, from_sequence: u64, limit: usize) -> Result<Vec<QlogRecord>> {
        self.store
            .read_from(self.session.session_id(), from_sequence, limit)
            .await
    }
}
