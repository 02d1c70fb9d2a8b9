use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, instrument, warn};
use vqlog_protocol::{LogWriter, QlogError, QlogEvent, QlogRecord, QlogResult, SessionId};

mod export;

pub use export::FileExporter;

pub const QLOG_VERSION: &str = "0.3";

#[async_trait]
pub trait QlogStore: Send + Sync {
    async fn append(&self, record: &QlogRecord) -> Result<()>;
    async fn read_from(
        &self,
        session_id: &SessionId,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<QlogRecord>>;
    async fn latest_sequence(&self, session_id: &SessionId) -> Result<u64>;
    /// Drop every stored session.
    async fn clear_all(&self) -> Result<()>;
}

/// One JSONL file per session under `<root>/logs`.
#[derive(Debug)]
pub struct FileQlogStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
    sequence_cache: Mutex<HashMap<SessionId, u64>>,
}

impl FileQlogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
            sequence_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn file_path(&self, session_id: &SessionId) -> PathBuf {
        self.root
            .join("logs")
            .join(format!("{}.jsonl", session_id.as_str()))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create log dir {parent:?}"))?;
        }
        Ok(())
    }

    fn lock_for(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.write_locks.lock();
        guard
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn scan_latest_sequence(path: &Path) -> Result<u64> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(0);
        }

        let file = OpenOptions::new().read(true).open(path).await?;
        let mut reader = BufReader::new(file).lines();
        let mut latest = 0_u64;

        while let Some(line) = reader.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: QlogRecord = serde_json::from_str(&line)
                .with_context(|| format!("failed parsing qlog line in {path:?}"))?;
            latest = latest.max(record.sequence);
        }
        Ok(latest)
    }

    fn cached_latest_sequence(&self, session_id: &SessionId) -> Option<u64> {
        self.sequence_cache.lock().get(session_id).copied()
    }

    fn update_cached_sequence(&self, session_id: &SessionId, latest: u64) {
        self.sequence_cache.lock().insert(session_id.clone(), latest);
    }
}

#[async_trait]
impl QlogStore for FileQlogStore {
    #[instrument(
        skip(self, record),
        fields(
            session_id = %record.session_id,
            sequence = record.sequence,
            event = record.event.name()
        )
    )]
    async fn append(&self, record: &QlogRecord) -> Result<()> {
        let path = self.file_path(&record.session_id);
        Self::ensure_parent(&path).await?;

        let lock = self.lock_for(&record.session_id);
        let _guard = lock.lock().await;

        let latest = match self.cached_latest_sequence(&record.session_id) {
            Some(latest) => latest,
            None => {
                let latest = Self::scan_latest_sequence(&path).await?;
                self.update_cached_sequence(&record.session_id, latest);
                latest
            }
        };

        let expected_sequence = latest.saturating_add(1);
        if record.sequence != expected_sequence {
            warn!(
                expected_sequence,
                actual_sequence = record.sequence,
                "sequence conflict while appending qlog record"
            );
            bail!(
                "sequence conflict for session {}: expected {}, got {}",
                record.session_id,
                expected_sequence,
                record.sequence
            );
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed opening qlog file {path:?}"))?;

        let line = serde_json::to_string(record).context("failed serializing qlog record")?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        self.update_cached_sequence(&record.session_id, record.sequence);
        debug!("qlog record appended");
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %session_id, from_sequence, limit))]
    async fn read_from(
        &self,
        session_id: &SessionId,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<QlogRecord>> {
        let path = self.file_path(session_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new().read(true).open(&path).await?;
        let mut reader = BufReader::new(file).lines();
        let mut out = Vec::new();

        while let Some(line) = reader.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: QlogRecord = serde_json::from_str(&line)
                .with_context(|| format!("failed parsing qlog line in {path:?}"))?;
            if record.sequence >= from_sequence {
                out.push(record);
            }
            if out.len() >= limit {
                break;
            }
        }
        debug!(count = out.len(), "qlog records loaded");
        Ok(out)
    }

    async fn latest_sequence(&self, session_id: &SessionId) -> Result<u64> {
        if let Some(latest) = self.cached_latest_sequence(session_id) {
            return Ok(latest);
        }

        let path = self.file_path(session_id);
        let latest = Self::scan_latest_sequence(&path).await?;
        self.update_cached_sequence(session_id, latest);
        Ok(latest)
    }

    #[instrument(skip(self))]
    async fn clear_all(&self) -> Result<()> {
        let locks: Vec<_> = self.write_locks.lock().values().cloned().collect();
        let mut guards = Vec::with_capacity(locks.len());
        for lock in &locks {
            guards.push(lock.lock().await);
        }

        let logs = self.root.join("logs");
        if fs::try_exists(&logs).await.unwrap_or(false) {
            fs::remove_dir_all(&logs)
                .await
                .with_context(|| format!("failed removing log dir {logs:?}"))?;
        }
        self.sequence_cache.lock().clear();
        drop(guards);
        self.write_locks.lock().clear();
        info!(dir = ?logs, "qlog logs wiped");
        Ok(())
    }
}

/// In-process store; handy for tests and short-lived sessions.
#[derive(Debug, Default)]
pub struct MemoryQlogStore {
    records: Mutex<HashMap<SessionId, Vec<QlogRecord>>>,
}

impl MemoryQlogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded fact across sessions, in append order per session.
    pub fn events(&self) -> Vec<QlogEvent> {
        self.records
            .lock()
            .values()
            .flat_map(|records| records.iter().map(|record| record.event.clone()))
            .collect()
    }

    pub fn records(&self, session_id: &SessionId) -> Vec<QlogRecord> {
        self.records
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl QlogStore for MemoryQlogStore {
    async fn append(&self, record: &QlogRecord) -> Result<()> {
        let mut records = self.records.lock();
        let session = records.entry(record.session_id.clone()).or_default();
        let expected_sequence = session.last().map(|r| r.sequence).unwrap_or(0) + 1;
        if record.sequence != expected_sequence {
            bail!(
                "sequence conflict for session {}: expected {}, got {}",
                record.session_id,
                expected_sequence,
                record.sequence
            );
        }
        session.push(record.clone());
        Ok(())
    }

    async fn read_from(
        &self,
        session_id: &SessionId,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<QlogRecord>> {
        Ok(self
            .records(session_id)
            .into_iter()
            .filter(|record| record.sequence >= from_sequence)
            .take(limit)
            .collect())
    }

    async fn latest_sequence(&self, session_id: &SessionId) -> Result<u64> {
        Ok(self
            .records
            .lock()
            .get(session_id)
            .and_then(|records| records.last())
            .map(|record| record.sequence)
            .unwrap_or(0))
    }

    async fn clear_all(&self) -> Result<()> {
        self.records.lock().clear();
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct QlogStreamHub {
    sender: broadcast::Sender<QlogRecord>,
}

impl QlogStreamHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    pub fn publish(&self, record: QlogRecord) {
        let _ = self.sender.send(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QlogRecord> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<QlogRecord> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

#[derive(Debug, Default)]
struct JournalCursor {
    session_id: Option<SessionId>,
    title: String,
    next_sequence: u64,
}

/// Log writer backed by a [`QlogStore`] and a [`QlogStreamHub`].
///
/// Sequence numbers are assigned under one async lock so concurrent
/// handlers cannot interleave an assignment with another append.
#[derive(Clone)]
pub struct QlogJournal {
    store: Arc<dyn QlogStore>,
    stream: QlogStreamHub,
    cursor: Arc<tokio::sync::Mutex<JournalCursor>>,
}

impl QlogJournal {
    pub fn new(store: Arc<dyn QlogStore>, stream: QlogStreamHub) -> Self {
        Self {
            store,
            stream,
            cursor: Arc::new(tokio::sync::Mutex::new(JournalCursor::default())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QlogRecord> {
        self.stream.subscribe()
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.cursor.lock().await.session_id.clone()
    }

    #[instrument(skip(self, event), fields(event = event.name()))]
    pub async fn append_and_publish(&self, event: QlogEvent) -> Result<QlogRecord> {
        let mut cursor = self.cursor.lock().await;
        let Some(session_id) = cursor.session_id.clone() else {
            bail!("log writer not initialised");
        };
        let record = QlogRecord::new(session_id, cursor.next_sequence, event);
        self.store.append(&record).await?;
        cursor.next_sequence += 1;
        drop(cursor);

        self.stream.publish(record.clone());
        debug!(sequence = record.sequence, "qlog record published");
        Ok(record)
    }

    /// Clear the store and restart numbering for the current session.
    pub async fn wipe(&self) -> Result<()> {
        let mut cursor = self.cursor.lock().await;
        self.store.clear_all().await?;
        if cursor.session_id.is_some() {
            cursor.next_sequence = 1;
        }
        Ok(())
    }

    pub async fn records(&self) -> Result<Vec<QlogRecord>> {
        let Some(session_id) = self.session_id().await else {
            return Ok(Vec::new());
        };
        self.store.read_from(&session_id, 1, usize::MAX).await
    }

    /// Render the session's records as a qlog JSON document.
    pub async fn render_document(&self) -> Result<Value> {
        let (session_id, title) = {
            let cursor = self.cursor.lock().await;
            (cursor.session_id.clone(), cursor.title.clone())
        };
        let records = self.records().await?;
        Ok(qlog_document(&title, session_id.as_ref(), &records))
    }
}

fn to_writer_error(error: anyhow::Error) -> QlogError {
    QlogError::Writer(format!("{error:#}"))
}

#[async_trait]
impl LogWriter for QlogJournal {
    #[instrument(skip(self, title), fields(session_id = %session_id))]
    async fn init(&self, session_id: &SessionId, title: &str) -> QlogResult<()> {
        let latest = self
            .store
            .latest_sequence(session_id)
            .await
            .map_err(to_writer_error)?;
        let mut cursor = self.cursor.lock().await;
        cursor.session_id = Some(session_id.clone());
        cursor.title = title.to_owned();
        cursor.next_sequence = latest + 1;
        debug!(next_sequence = cursor.next_sequence, "qlog journal initialised");
        Ok(())
    }

    async fn record(&self, event: QlogEvent) -> QlogResult<()> {
        self.append_and_publish(event)
            .await
            .map(|_| ())
            .map_err(to_writer_error)
    }

    async fn generate_blob(&self) -> QlogResult<String> {
        let document = self.render_document().await.map_err(to_writer_error)?;
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

fn qlog_document(title: &str, session_id: Option<&SessionId>, records: &[QlogRecord]) -> Value {
    let reference = records.first().map(|record| record.timestamp);
    let events: Vec<Value> = records
        .iter()
        .map(|record| {
            let relative_ms = reference
                .map(|start| (record.timestamp - start).num_microseconds().unwrap_or(0) as f64 / 1000.0)
                .unwrap_or(0.0);
            let mut data = serde_json::to_value(&record.event).unwrap_or(Value::Null);
            if let Some(object) = data.as_object_mut() {
                object.remove("type");
            }
            json!({
                "time": relative_ms,
                "name": format!("{}:{}", record.event.category(), record.event.name()),
                "data": data,
            })
        })
        .collect();

    json!({
        "qlog_version": QLOG_VERSION,
        "qlog_format": "JSON",
        "title": title,
        "traces": [{
            "vantage_point": { "type": "client" },
            "common_fields": {
                "group_id": session_id.map(SessionId::as_str),
                "reference_time": reference.map(|t| t.timestamp_millis()),
                "time_format": "relative",
            },
            "events": events,
        }],
    })
}
