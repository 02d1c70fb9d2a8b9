//! Logging session lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Activation state of a logging session.
///
/// `Uninitialised → Initialising → Initialised → Active ⇄ Stopped`.
/// Only `Active` permits emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Uninitialised,
    Initialising,
    Initialised,
    Active,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialised => "uninitialised",
            Self::Initialising => "initialising",
            Self::Initialised => "initialised",
            Self::Active => "active",
            Self::Stopped => "stopped",
        }
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialised, Self::Initialising)
                | (Self::Initialising, Self::Initialised)
                | (Self::Initialised, Self::Active)
                | (Self::Active, Self::Stopped)
                | (Self::Stopped, Self::Active)
        )
    }

    /// Setup completed at some point (`Initialised`, `Active`, or `Stopped`).
    pub fn is_initialised(self) -> bool {
        matches!(self, Self::Initialised | Self::Active | Self::Stopped)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
