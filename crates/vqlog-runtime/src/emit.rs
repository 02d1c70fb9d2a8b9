use std::sync::Arc;

use tracing::{debug, warn};
use vqlog_protocol::{LogWriter, QlogEvent, QlogResult};

use crate::lifecycle::SessionLifecycle;

/// Outcome of turning one event or poll reading into a log fact.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitCandidate {
    /// Nothing to report (missing stream, metric or payload field).
    NoSample,
    /// Reading equals the last emitted value.
    Unchanged,
    Emit(QlogEvent),
}

impl EmitCandidate {
    pub fn is_emit(&self) -> bool {
        matches!(self, Self::Emit(_))
    }

    pub fn event(&self) -> Option<&QlogEvent> {
        match self {
            Self::Emit(event) => Some(event),
            Self::NoSample | Self::Unchanged => None,
        }
    }
}

/// Gate check plus log-writer call, shared by routers and pollers.
#[derive(Clone)]
pub struct Emitter {
    lifecycle: Arc<SessionLifecycle>,
    writer: Arc<dyn LogWriter>,
}

impl Emitter {
    pub fn new(lifecycle: Arc<SessionLifecycle>, writer: Arc<dyn LogWriter>) -> Self {
        Self { lifecycle, writer }
    }

    pub fn is_open(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }

    pub fn writer(&self) -> &Arc<dyn LogWriter> {
        &self.writer
    }

    /// Forward an `Emit` candidate while the gate is open.
    ///
    /// Returns `true` only when the writer accepted the fact. Writer
    /// failures are logged and absorbed.
    pub async fn emit(&self, candidate: EmitCandidate) -> bool {
        let EmitCandidate::Emit(event) = candidate else {
            return false;
        };
        if !self.is_open() {
            debug!(event = event.name(), "gate closed, fact dropped");
            return false;
        }
        let name = event.name();
        match self.writer.record(event).await {
            Ok(()) => true,
            Err(error) => {
                warn!(event = name, error = %error, "log writer rejected fact");
                false
            }
        }
    }

    /// Record a setup fact regardless of the gate.
    pub async fn record_ungated(&self, event: QlogEvent) -> QlogResult<()> {
        self.writer.record(event).await
    }
}
