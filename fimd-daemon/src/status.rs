//! Real-time monitor lifecycle status.
//!
//! `Stopped → Running → Paused → Running → …`. Any other requested move is
//! ignored: the state stays put and nothing is logged.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeStatus {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// The log-worthy event produced by an accepted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Paused,
    Resumed,
}

impl RealtimeStatus {
    /// Pure transition function. `None` means the move is not defined.
    pub fn transition(self, requested: RealtimeStatus) -> Option<(RealtimeStatus, Transition)> {
        match (self, requested) {
            (RealtimeStatus::Stopped, RealtimeStatus::Running) => {
                Some((RealtimeStatus::Running, Transition::Started))
            }
            (RealtimeStatus::Running, RealtimeStatus::Paused) => {
                Some((RealtimeStatus::Paused, Transition::Paused))
            }
            (RealtimeStatus::Paused, RealtimeStatus::Running) => {
                Some((RealtimeStatus::Running, Transition::Resumed))
            }
            _ => None,
        }
    }

    /// State after requesting `requested`; unchanged when the move is illegal.
    pub fn next(self, requested: RealtimeStatus) -> RealtimeStatus {
        self.transition(requested)
            .map(|(state, _)| state)
            .unwrap_or(self)
    }
}

impl fmt::Display for RealtimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealtimeStatus::Stopped => write!(f, "stopped"),
            RealtimeStatus::Running => write!(f, "running"),
            RealtimeStatus::Paused => write!(f, "paused"),
        }
    }
}

/// The process-wide status holder. Callers announce the state they want.
#[derive(Debug, Default)]
pub struct StatusTracker {
    state: Mutex<RealtimeStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RealtimeStatus {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a move to `next`. Returns the transition when it was accepted.
    pub fn announce(&self, next: RealtimeStatus) -> Option<Transition> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (new_state, transition) = state.transition(next)?;
        *state = new_state;
        drop(state);

        match transition {
            Transition::Started => tracing::info!("real-time monitoring started"),
            Transition::Paused => tracing::info!("real-time monitoring paused"),
            Transition::Resumed => tracing::info!("real-time monitoring resumed"),
        }
        Some(transition)
    }
}
