//! Latest-value store fed by the asynchronous producers.
//!
//! Every field has its own lock and is replaced wholesale. Readers get a copy
//! per field; no cross-field consistency is promised.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use motion_arbiter_core::{BehaviorStatus, ControlMode, HazardStatus, HazardStatusStamped};

use crate::clock::Clock;

/// Copy of every field at one read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HazardSnapshot {
    pub hazard: Option<HazardStatusStamped>,
    pub speed: Option<f64>,
    pub control_mode: Option<ControlMode>,
    pub comfortable_stop: Option<BehaviorStatus>,
    pub emergency_stop: Option<BehaviorStatus>,
}

impl HazardSnapshot {
    /// Odometry not received yet reads as standing still.
    pub fn speed_or_zero(&self) -> f64 {
        self.speed.unwrap_or(0.0)
    }

    pub fn control_mode_or_default(&self) -> ControlMode {
        self.control_mode.unwrap_or_default()
    }

    pub fn comfortable_stop_status(&self) -> BehaviorStatus {
        self.comfortable_stop.unwrap_or_default()
    }

    pub fn emergency_stop_status(&self) -> BehaviorStatus {
        self.emergency_stop.unwrap_or_default()
    }
}

pub struct HazardSnapshotStore {
    clock: Arc<dyn Clock>,
    hazard: Mutex<Option<HazardStatusStamped>>,
    speed: Mutex<Option<f64>>,
    control_mode: Mutex<Option<ControlMode>>,
    comfortable_stop: Mutex<Option<BehaviorStatus>>,
    emergency_stop: Mutex<Option<BehaviorStatus>>,
}

impl std::fmt::Debug for HazardSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HazardSnapshotStore")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl HazardSnapshotStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            hazard: Mutex::new(None),
            speed: Mutex::new(None),
            control_mode: Mutex::new(None),
            comfortable_stop: Mutex::new(None),
            emergency_stop: Mutex::new(None),
        }
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Store a hazard report stamped with its receipt time.
    pub fn set_hazard_status(&self, status: HazardStatus) {
        let stamped = HazardStatusStamped {
            stamp: self.clock.now(),
            status,
        };
        self.set_hazard_status_stamped(stamped);
    }

    pub fn set_hazard_status_stamped(&self, stamped: HazardStatusStamped) {
        *self.hazard.lock().expect("hazard status mutex poisoned") = Some(stamped);
    }

    pub fn set_speed(&self, speed: f64) {
        *self.speed.lock().expect("odometry mutex poisoned") = Some(speed);
    }

    pub fn set_control_mode(&self, mode: ControlMode) {
        *self.control_mode.lock().expect("control mode mutex poisoned") = Some(mode);
    }

    pub fn set_comfortable_stop_status(&self, status: BehaviorStatus) {
        *self
            .comfortable_stop
            .lock()
            .expect("comfortable stop status mutex poisoned") = Some(status);
    }

    pub fn set_emergency_stop_status(&self, status: BehaviorStatus) {
        *self
            .emergency_stop
            .lock()
            .expect("emergency stop status mutex poisoned") = Some(status);
    }

    pub fn snapshot(&self) -> HazardSnapshot {
        HazardSnapshot {
            hazard: *self.hazard.lock().expect("hazard status mutex poisoned"),
            speed: *self.speed.lock().expect("odometry mutex poisoned"),
            control_mode: *self.control_mode.lock().expect("control mode mutex poisoned"),
            comfortable_stop: *self
                .comfortable_stop
                .lock()
                .expect("comfortable stop status mutex poisoned"),
            emergency_stop: *self
                .emergency_stop
                .lock()
                .expect("emergency stop status mutex poisoned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn hazard_is_stamped_on_receipt() {
        let clock = Arc::new(ManualClock::new(Duration::from_secs(7)));
        let store = HazardSnapshotStore::new(clock.clone());
        assert_eq!(store.snapshot(), HazardSnapshot::default());

        store.set_hazard_status(HazardStatus::default());
        clock.advance(Duration::from_secs(1));
        let snap = store.snapshot();
        assert_eq!(snap.hazard.map(|h| h.stamp), Some(Duration::from_secs(7)));
        assert_eq!(snap.speed_or_zero(), 0.0);
        assert_eq!(snap.emergency_stop_status(), BehaviorStatus::NotAvailable);
    }

    #[test]
    fn fields_are_replaced_independently() {
        let store = HazardSnapshotStore::new(Arc::new(ManualClock::default()));
        store.set_speed(3.0);
        store.set_control_mode(ControlMode::Autonomous);
        store.set_speed(1.5);
        let snap = store.snapshot();
        assert_eq!(snap.speed, Some(1.5));
        assert_eq!(snap.control_mode, Some(ControlMode::Autonomous));
        assert_eq!(snap.hazard, None);
    }
}
