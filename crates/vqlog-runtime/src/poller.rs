use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vqlog_protocol::{
    MediaElement, MediaEngine, MediaType, PollSample, QlogEvent, StatusColor, StatusDisplay,
};

use crate::dedup::{DedupCache, Metric, decoded_bitrate_kbps};
use crate::emit::Emitter;
use crate::status::{
    BITRATE_KEY, BUFFER_LEVEL_AUDIO_KEY, BUFFER_LEVEL_VIDEO_KEY, FRAMERATE_KEY, WEBKIT_BITRATE_KEY,
};

/// Reads buffer levels and the current video representation from the engine.
pub struct MetricsPoller {
    engine: Arc<dyn MediaEngine>,
    element: Arc<dyn MediaElement>,
    cache: Arc<Mutex<DedupCache>>,
    emitter: Emitter,
    status: Arc<dyn StatusDisplay>,
}

impl MetricsPoller {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        element: Arc<dyn MediaElement>,
        cache: Arc<Mutex<DedupCache>>,
        emitter: Emitter,
        status: Arc<dyn StatusDisplay>,
    ) -> Self {
        Self {
            engine,
            element,
            cache,
            emitter,
            status,
        }
    }

    /// Read the engine's metrics; `None` without an active stream.
    pub fn sample(&self) -> Option<PollSample> {
        let stream = self.engine.active_stream()?;
        let switch = self.engine.current_representation_switch(MediaType::Video);
        let representation = switch.as_ref().and_then(|switch| {
            self.engine
                .adaptation_for(&stream, MediaType::Video)
                .and_then(|adaptation| adaptation.find(&switch.to).cloned())
        });

        let bandwidth_bps = match (&representation, &switch) {
            (Some(representation), _) => Some(representation.bandwidth),
            (None, Some(switch)) => self
                .engine
                .bandwidth_for_representation(&switch.to, stream.index),
            (None, None) => None,
        };

        Some(PollSample {
            buffer_level_video: self.engine.current_buffer_level(MediaType::Video),
            buffer_level_audio: self.engine.current_buffer_level(MediaType::Audio),
            frame_rate: representation
                .as_ref()
                .and_then(|rep| rep.frame_rate)
                .unwrap_or(0.0),
            representation_id: representation.map(|rep| rep.id),
            bandwidth_bps,
            decoded_byte_count: self.element.decoded_byte_count(),
        })
    }

    fn publish_status(&self, sample: &PollSample) {
        let status = self.status.as_ref();
        status.set_status(
            BUFFER_LEVEL_VIDEO_KEY,
            &format!("{} s", sample.buffer_level_video),
            StatusColor::Black,
        );
        status.set_status(
            BUFFER_LEVEL_AUDIO_KEY,
            &format!("{} s", sample.buffer_level_audio),
            StatusColor::Black,
        );
        status.set_status(
            FRAMERATE_KEY,
            &format!("{} fps", sample.frame_rate),
            StatusColor::Black,
        );
        status.set_status(
            BITRATE_KEY,
            &format!("{} Kbps", sample.bitrate_kbps()),
            StatusColor::Black,
        );
    }

    /// One poll. Returns the number of facts written.
    pub async fn tick(&self) -> usize {
        if !self.emitter.is_open() {
            return 0;
        }
        let Some(sample) = self.sample() else {
            debug!("no active stream");
            return 0;
        };
        self.publish_status(&sample);

        let mut written = 0;
        for (media_type, level) in [
            (MediaType::Video, sample.buffer_level_video),
            (MediaType::Audio, sample.buffer_level_audio),
        ] {
            let Some(metric) = Metric::buffer_level(media_type, level) else {
                continue;
            };
            let candidate = self
                .cache
                .lock()
                .candidate(&metric, || QlogEvent::BufferLevelUpdate {
                    media_type,
                    level_ms: level * 1000.0,
                    stream_id: None,
                });
            if self.emitter.emit(candidate).await {
                self.cache.lock().record(&metric);
                written += 1;
            }
        }

        if let (Some(representation_id), Some(bandwidth_bps)) =
            (sample.representation_id.as_ref(), sample.bandwidth_bps)
        {
            let metric = Metric::Representation(representation_id.as_str());
            let candidate = self
                .cache
                .lock()
                .candidate(&metric, || QlogEvent::RepresentationSwitch {
                    media_type: MediaType::Video,
                    representation_id: representation_id.clone(),
                    bandwidth_bps,
                });
            if self.emitter.emit(candidate).await {
                self.cache.lock().record(&metric);
                written += 1;
            }
        }
        written
    }
}

/// Derives a display bitrate from the element's cumulative decoded-byte counter.
pub struct DecodedBytesPoller {
    element: Arc<dyn MediaElement>,
    cache: Arc<Mutex<DedupCache>>,
    emitter: Emitter,
    status: Arc<dyn StatusDisplay>,
    interval: Duration,
}

impl DecodedBytesPoller {
    pub fn new(
        element: Arc<dyn MediaElement>,
        cache: Arc<Mutex<DedupCache>>,
        emitter: Emitter,
        status: Arc<dyn StatusDisplay>,
        interval: Duration,
    ) -> Self {
        Self {
            element,
            cache,
            emitter,
            status,
            interval,
        }
    }

    /// Capability probe: the element exposes a decoded-byte counter.
    pub fn is_supported(&self) -> bool {
        self.element.decoded_byte_count().is_some()
    }

    /// One poll. Returns the unrounded Kbps, or `None` when nothing was read.
    pub async fn tick(&self) -> Option<f64> {
        if !self.emitter.is_open() {
            return None;
        }
        let current = self.element.decoded_byte_count()?;
        let previous = self.cache.lock().swap_decoded_byte_count(current);
        let kbps = decoded_bitrate_kbps(previous, current, self.interval.as_secs_f64());
        self.status.set_status(
            WEBKIT_BITRATE_KEY,
            &format!("{} Kbps", kbps.round()),
            StatusColor::Black,
        );
        debug!(previous, current, kbps, "decoded bitrate sampled");
        Some(kbps)
    }
}

/// A running poller task, cancelled and aborted on drop.
pub struct PollerHandle {
    name: &'static str,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop scheduling ticks and wait for an in-flight tick to finish.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(()) => Ok(()),
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => Err(err),
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Missed ticks are skipped, so at most one catch-up tick follows an overrun.
fn spawn_poller<F, Fut>(
    name: &'static str,
    start: Instant,
    period: Duration,
    mut tick: F,
) -> PollerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let loop_token = cancel.clone();
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = loop_token.cancelled() => {
                    break;
                }
                _ = ticker.tick() => {
                    tick().await;
                }
            }
        }
        debug!(poller = name, "poller loop exited");
    });
    PollerHandle {
        name,
        cancel,
        task: Some(task),
    }
}

/// Owns both pollers and their running tasks.
pub struct PollingScheduler {
    metrics: Arc<MetricsPoller>,
    decoded: Arc<DecodedBytesPoller>,
    metrics_interval: Duration,
    decoded_interval: Duration,
    handles: Mutex<Vec<PollerHandle>>,
}

impl PollingScheduler {
    pub fn new(
        metrics: MetricsPoller,
        decoded: DecodedBytesPoller,
        metrics_interval: Duration,
    ) -> Self {
        let decoded_interval = decoded.interval;
        Self {
            metrics: Arc::new(metrics),
            decoded: Arc::new(decoded),
            metrics_interval: metrics_interval.max(Duration::from_millis(1)),
            decoded_interval: decoded_interval.max(Duration::from_millis(1)),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn metrics(&self) -> &MetricsPoller {
        &self.metrics
    }

    pub fn decoded(&self) -> &DecodedBytesPoller {
        &self.decoded
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }

    pub fn running(&self) -> Vec<&'static str> {
        self.handles.lock().iter().map(PollerHandle::name).collect()
    }

    /// Spawn the metrics poller and, when supported, the decoded-bytes poller.
    ///
    /// The decoded-bytes poller samples immediately; the metrics poller
    /// waits one interval.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }

        let metrics = Arc::clone(&self.metrics);
        handles.push(spawn_poller(
            "metrics",
            Instant::now() + self.metrics_interval,
            self.metrics_interval,
            move || {
                let metrics = Arc::clone(&metrics);
                async move {
                    metrics.tick().await;
                }
            },
        ));

        if self.decoded.is_supported() {
            let decoded = Arc::clone(&self.decoded);
            handles.push(spawn_poller(
                "decoded_bytes",
                Instant::now(),
                self.decoded_interval,
                move || {
                    let decoded = Arc::clone(&decoded);
                    async move {
                        decoded.tick().await;
                    }
                },
            ));
        } else {
            debug!("element has no decoded-byte counter");
        }
        info!(pollers = handles.len(), "pollers started");
    }

    /// Cancel every poller and wait for in-flight ticks.
    pub async fn stop(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        let count = handles.len();
        for handle in handles {
            let name = handle.name();
            if let Err(error) = handle.shutdown().await {
                debug!(poller = name, error = %error, "poller task ended abnormally");
            }
        }
        if count > 0 {
            info!(pollers = count, "pollers stopped");
        }
    }

    /// Abort every poller without waiting.
    pub fn abort(&self) {
        self.handles.lock().clear();
    }
}
