use parking_lot::Mutex;
use tracing::info;
use vqlog_protocol::{LifecycleState, QlogError, QlogResult};

/// Activation state machine shared by every handler and poller of a session.
///
/// Each transition is one short critical section; the gate is simply
/// `state == Active`.
#[derive(Debug, Default)]
pub struct SessionLifecycle {
    state: Mutex<LifecycleState>,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// Move along one edge of the lifecycle graph, returning the previous state.
    pub fn transition(&self, next: LifecycleState) -> QlogResult<LifecycleState> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(QlogError::InvalidTransition { from, to: next });
        }
        *state = next;
        drop(state);
        info!(from = %from, to = %next, "lifecycle transition");
        Ok(from)
    }

    /// Open the gate. `Ok(false)` when already active.
    pub fn activate(&self) -> QlogResult<bool> {
        let mut state = self.state.lock();
        if *state == LifecycleState::Active {
            return Ok(false);
        }
        let from = *state;
        if !from.can_transition_to(LifecycleState::Active) {
            return Err(QlogError::InvalidTransition {
                from,
                to: LifecycleState::Active,
            });
        }
        *state = LifecycleState::Active;
        drop(state);
        info!(from = %from, to = %LifecycleState::Active, "lifecycle transition");
        Ok(true)
    }

    /// Close the gate. `false` when the session was not active.
    pub fn deactivate(&self) -> bool {
        let mut state = self.state.lock();
        if *state != LifecycleState::Active {
            return false;
        }
        *state = LifecycleState::Stopped;
        drop(state);
        info!(from = %LifecycleState::Active, to = %LifecycleState::Stopped, "lifecycle transition");
        true
    }
}
