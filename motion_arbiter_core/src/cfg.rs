use std::time::Duration;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::geometry::Pose;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnSignalCfg {
    pub intersection_search_distance: f64,
    pub intersection_search_time: f64,
    pub intersection_angle_threshold_deg: f64,
    /// Lateral shift magnitude below which a shift counts as zero.
    pub shift_length_threshold: f64,
    pub search_time: f64,
    pub minimum_search_distance: f64,
    /// How far ahead of a shift start the blinker may come on early.
    pub desired_lead_margin: f64,
    pub on_swerving: bool,
    pub nearest_dist_threshold: f64,
    pub nearest_yaw_threshold: f64,
}

impl Default for TurnSignalCfg {
    fn default() -> Self {
        Self {
            intersection_search_distance: 30.0,
            intersection_search_time: 3.0,
            intersection_angle_threshold_deg: 15.0,
            shift_length_threshold: 0.3,
            search_time: 3.0,
            minimum_search_distance: 10.0,
            desired_lead_margin: 5.0,
            on_swerving: true,
            nearest_dist_threshold: 3.0,
            nearest_yaw_threshold: 1.046,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurningHazardOn {
    pub emergency: bool,
}

impl Default for TurningHazardOn {
    fn default() -> Self {
        Self { emergency: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyHandlerCfg {
    /// Tick rate in Hz.
    pub update_rate: u32,
    /// Seconds without a hazard report before it counts as stale.
    pub timeout_hazard_status: f64,
    pub use_parking_after_stopped: bool,
    pub use_comfortable_stop: bool,
    pub turning_hazard_on: TurningHazardOn,
    /// Seconds to wait for an operate/cancel response.
    pub service_timeout: f64,
}

impl Default for EmergencyHandlerCfg {
    fn default() -> Self {
        Self {
            update_rate: 10,
            timeout_hazard_status: 0.5,
            use_parking_after_stopped: false,
            use_comfortable_stop: false,
            turning_hazard_on: TurningHazardOn::default(),
            service_timeout: 0.05,
        }
    }
}

impl EmergencyHandlerCfg {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.update_rate.max(1)))
    }

    pub fn hazard_status_timeout(&self) -> Duration {
        seconds(self.timeout_hazard_status)
    }

    pub fn service_wait(&self) -> Duration {
        seconds(self.service_timeout)
    }
}

/// Negative and NaN read as zero, anything past `Duration::MAX` saturates.
fn seconds(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Rectangular vehicle outline relative to `base_link`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleShape {
    pub base_link_to_front: f64,
    pub base_link_to_rear: f64,
    pub half_width: f64,
}

impl Default for VehicleShape {
    fn default() -> Self {
        Self {
            base_link_to_front: 4.89,
            base_link_to_rear: 1.03,
            half_width: 0.96,
        }
    }
}

impl VehicleShape {
    /// Footprint corners in the `base_link` frame, counter-clockwise.
    pub fn footprint(&self) -> [DVec2; 4] {
        [
            DVec2::new(self.base_link_to_front, self.half_width),
            DVec2::new(-self.base_link_to_rear, self.half_width),
            DVec2::new(-self.base_link_to_rear, -self.half_width),
            DVec2::new(self.base_link_to_front, -self.half_width),
        ]
    }

    /// Footprint placed at `pose`.
    pub fn footprint_at(&self, pose: &Pose) -> [DVec2; 4] {
        self.footprint().map(|corner| pose.transform(corner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_timeouts_do_not_panic() {
        let cfg = EmergencyHandlerCfg {
            timeout_hazard_status: f64::INFINITY,
            service_timeout: f64::NAN,
            ..EmergencyHandlerCfg::default()
        };
        assert_eq!(cfg.hazard_status_timeout(), Duration::MAX);
        assert_eq!(cfg.service_wait(), Duration::ZERO);

        let cfg = EmergencyHandlerCfg {
            timeout_hazard_status: 1e30,
            service_timeout: -1.0,
            ..EmergencyHandlerCfg::default()
        };
        assert_eq!(cfg.hazard_status_timeout(), Duration::MAX);
        assert_eq!(cfg.service_wait(), Duration::ZERO);

        let cfg = EmergencyHandlerCfg::default();
        assert_eq!(cfg.hazard_status_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.service_wait(), Duration::from_millis(50));
    }
}
