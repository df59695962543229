use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fault severity, ordered from harmless to worst.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HazardLevel {
    #[default]
    NoFault,
    SafeFault,
    LatentFault,
    SinglePointFault,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardStatus {
    pub level: HazardLevel,
    pub emergency: bool,
    /// Emergency latched by the fault monitor until an operator clears it.
    pub emergency_holding: bool,
}

/// A hazard status with the time it was received.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardStatusStamped {
    pub stamp: Duration,
    pub status: HazardStatus,
}

impl HazardStatusStamped {
    /// Strictly older than `timeout` at `now`.
    pub fn is_stale(&self, now: Duration, timeout: Duration) -> bool {
        now.saturating_sub(self.stamp) > timeout
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    #[default]
    NoCommand,
    Autonomous,
    SteerOnly,
    VelocityOnly,
    Manual,
    Disengaged,
    NotReady,
}

impl ControlMode {
    #[inline]
    pub fn is_autonomous(self) -> bool {
        self == ControlMode::Autonomous
    }
}

/// Status reported by one MRM behavior module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorStatus {
    #[default]
    NotAvailable,
    Available,
    Operating,
    Succeeded,
    Failed,
}

impl BehaviorStatus {
    #[inline]
    pub fn is_available(self) -> bool {
        self != BehaviorStatus::NotAvailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_is_strict() {
        let hs = HazardStatusStamped {
            stamp: Duration::from_millis(1000),
            status: HazardStatus::default(),
        };
        let timeout = Duration::from_millis(500);
        assert!(!hs.is_stale(Duration::from_millis(1500), timeout));
        assert!(hs.is_stale(Duration::from_millis(1501), timeout));
        // clock behind the stamp never reads as stale
        assert!(!hs.is_stale(Duration::from_millis(10), timeout));
    }

    #[test]
    fn levels_are_ordered() {
        assert!(HazardLevel::SinglePointFault > HazardLevel::LatentFault);
        assert!(HazardLevel::LatentFault > HazardLevel::SafeFault);
    }
}
