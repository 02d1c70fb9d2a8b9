use futures_util::StreamExt;
use futures_util::future::ready;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use vqlog_protocol::{ElementEvent, ElementEventStream, MediaElement, ReadyState};

#[derive(Debug, Clone, Copy)]
struct ElementState {
    current_time: f64,
    playback_rate: f64,
    volume: f64,
    ready_state: ReadyState,
    decoded_byte_count: Option<u64>,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            playback_rate: 1.0,
            volume: 1.0,
            ready_state: ReadyState::HaveNothing,
            decoded_byte_count: None,
        }
    }
}

/// Media element double; state changes do not fire events on their own.
pub struct ScriptedElement {
    events: broadcast::Sender<ElementEvent>,
    state: Mutex<ElementState>,
}

impl ScriptedElement {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            events,
            state: Mutex::new(ElementState::default()),
        }
    }

    pub fn set_current_time(&self, seconds: f64) {
        self.state.lock().current_time = seconds;
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.state.lock().playback_rate = rate;
    }

    pub fn set_volume(&self, volume: f64) {
        self.state.lock().volume = volume;
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().ready_state = ready_state;
    }

    /// Expose a cumulative decoded-byte counter at `bytes`.
    pub fn set_decoded_byte_count(&self, bytes: u64) {
        self.state.lock().decoded_byte_count = Some(bytes);
    }

    pub fn dispatch(&self, event: ElementEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }
}

impl Default for ScriptedElement {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaElement for ScriptedElement {
    fn events(&self) -> ElementEventStream {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|item| ready(item.ok()))
            .boxed()
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn decoded_byte_count(&self) -> Option<u64> {
        self.state.lock().decoded_byte_count
    }
}
