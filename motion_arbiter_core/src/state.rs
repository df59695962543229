use std::fmt;
use std::time::Duration;

use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OperationState {
    #[default]
    Normal,
    Operating,
    Succeeded,
    Failed,
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Normal => "NORMAL",
            OperationState::Operating => "OPERATING",
            OperationState::Succeeded => "SUCCEEDED",
            OperationState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MrmBehavior {
    #[default]
    None,
    ComfortableStop,
    EmergencyStop,
}

impl fmt::Display for MrmBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MrmBehavior::None => "NONE",
            MrmBehavior::ComfortableStop => "COMFORTABLE_STOP",
            MrmBehavior::EmergencyStop => "EMERGENCY_STOP",
        };
        f.write_str(s)
    }
}

/// State of the escalation machine. Starts at `{Normal, None}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MrmState {
    pub state: OperationState,
    pub behavior: MrmBehavior,
    /// Set on every transition, and to the tick time each time the handler publishes.
    pub stamp: Duration,
}

impl MrmState {
    #[inline]
    pub fn transition_to(&mut self, next: OperationState, now: Duration) {
        debug!("MRM state changed: {} -> {}", self.state, next);
        self.state = next;
        self.stamp = now;
    }

    #[inline]
    pub fn reset(&mut self, now: Duration) {
        self.state = OperationState::Normal;
        self.behavior = MrmBehavior::None;
        self.stamp = now;
    }
}
