use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use motion_arbiter_core::{EmergencyHandlerCfg, TurnSignalCfg, VehicleShape};

/// All tunables, as laid out in the YAML parameter file. Missing sections
/// fall back to their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterParams {
    pub emergency_handler: EmergencyHandlerCfg,
    pub turn_signal: TurnSignalCfg,
    pub vehicle: VehicleShape,
}

impl ArbiterParams {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading parameter file {}", path.display()))?;
        Self::from_yaml(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let params: ArbiterParams = serde_yaml::from_str(contents)?;
        let eh = &params.emergency_handler;
        anyhow::ensure!(eh.update_rate > 0, "emergency_handler.update_rate must be positive");
        for (key, secs) in [
            ("timeout_hazard_status", eh.timeout_hazard_status),
            ("service_timeout", eh.service_timeout),
        ] {
            anyhow::ensure!(
                secs.is_finite() && secs >= 0.0,
                "emergency_handler.{key} must be a finite, non-negative number of seconds (got {secs})"
            );
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "
emergency_handler:
  use_comfortable_stop: true
  timeout_hazard_status: 1.0
turn_signal:
  intersection_search_distance: 50.0
";
        let p = ArbiterParams::from_yaml(yaml).expect("valid yaml");
        assert!(p.emergency_handler.use_comfortable_stop);
        assert_eq!(p.emergency_handler.timeout_hazard_status, 1.0);
        assert_eq!(p.emergency_handler.update_rate, 10);
        assert!(p.emergency_handler.turning_hazard_on.emergency);
        assert_eq!(p.turn_signal.intersection_search_distance, 50.0);
        assert_eq!(p.turn_signal.intersection_search_time, 3.0);
        assert_eq!(p.vehicle, VehicleShape::default());
    }

    #[test]
    fn zero_rate_is_rejected() {
        let err = ArbiterParams::from_yaml("emergency_handler:\n  update_rate: 0\n").unwrap_err();
        assert!(err.to_string().contains("update_rate"));
    }

    #[test]
    fn unbounded_timeouts_are_rejected() {
        let err = ArbiterParams::from_yaml("emergency_handler:\n  timeout_hazard_status: .inf\n")
            .unwrap_err();
        assert!(err.to_string().contains("timeout_hazard_status"));

        let err = ArbiterParams::from_yaml("emergency_handler:\n  service_timeout: -0.1\n")
            .unwrap_err();
        assert!(err.to_string().contains("service_timeout"));

        let err = ArbiterParams::from_yaml("emergency_handler:\n  service_timeout: .nan\n")
            .unwrap_err();
        assert!(err.to_string().contains("service_timeout"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ArbiterParams::load("/nonexistent/arbiter.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/arbiter.yaml"));
    }
}
