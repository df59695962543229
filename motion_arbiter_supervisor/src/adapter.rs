//! Boundary adapter: raw middleware messages (numeric codes) in and out.
//!
//! Inbound messages are decoded and written into the snapshot store; outbound
//! values are encoded from the engines' typed results. No IO here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use motion_arbiter_core::wire::{gear_code, hazard_lights_code};
use motion_arbiter_core::{
    BehaviorStatus, ControlMode, DecodeError, HazardLevel, HazardStatus, MrmBehavior, MrmState,
    OperationState, TurnSignalDecision, WireCode,
};

use crate::handler::HandlerOutput;
use crate::store::HazardSnapshotStore;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardStatusMsg {
    pub level: u8,
    pub emergency: bool,
    pub emergency_holding: bool,
}

impl HazardStatusMsg {
    pub fn decode(&self) -> Result<HazardStatus, DecodeError> {
        Ok(HazardStatus {
            level: HazardLevel::from_code(self.level)?,
            emergency: self.emergency,
            emergency_holding: self.emergency_holding,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryMsg {
    /// Longitudinal velocity [m/s].
    pub linear_x: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlModeMsg {
    pub mode: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorStatusMsg {
    pub state: u8,
}

/// Everything the snapshot store is fed with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum InboundMessage {
    HazardStatus(HazardStatusMsg),
    Odometry(OdometryMsg),
    ControlMode(ControlModeMsg),
    ComfortableStopStatus(BehaviorStatusMsg),
    EmergencyStopStatus(BehaviorStatusMsg),
}

/// Decode one message into its store field. A bad code leaves the field as
/// it was.
pub fn apply_message(store: &HazardSnapshotStore, msg: &InboundMessage) -> Result<(), DecodeError> {
    match msg {
        InboundMessage::HazardStatus(m) => store.set_hazard_status(m.decode()?),
        InboundMessage::Odometry(m) => store.set_speed(m.linear_x),
        InboundMessage::ControlMode(m) => store.set_control_mode(ControlMode::from_code(m.mode)?),
        InboundMessage::ComfortableStopStatus(m) => {
            store.set_comfortable_stop_status(BehaviorStatus::from_code(m.state)?)
        }
        InboundMessage::EmergencyStopStatus(m) => {
            store.set_emergency_stop_status(BehaviorStatus::from_code(m.state)?)
        }
    }
    Ok(())
}

/// Apply a batch in order, skipping undecodable messages. Returns how many
/// were applied.
pub fn apply_batch(store: &HazardSnapshotStore, msgs: &[InboundMessage]) -> usize {
    let mut applied = 0;
    for msg in msgs {
        match apply_message(store, msg) {
            Ok(()) => applied += 1,
            Err(err) => warn!(%err, ?msg, "dropping undecodable message"),
        }
    }
    applied
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrmStateMsg {
    pub stamp_nanos: u64,
    pub state: u8,
    pub behavior: u8,
}

impl From<&MrmState> for MrmStateMsg {
    fn from(s: &MrmState) -> Self {
        Self {
            stamp_nanos: u64::try_from(s.stamp.as_nanos()).unwrap_or(u64::MAX),
            state: s.state.to_code(),
            behavior: s.behavior.to_code(),
        }
    }
}

impl MrmStateMsg {
    pub fn decode(&self) -> Result<MrmState, DecodeError> {
        Ok(MrmState {
            state: OperationState::from_code(self.state)?,
            behavior: MrmBehavior::from_code(self.behavior)?,
            stamp: Duration::from_nanos(self.stamp_nanos),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardLightsMsg {
    pub command: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearMsg {
    pub command: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnIndicatorsMsg {
    pub command: u8,
}

/// Messages one handler tick publishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerMessages {
    pub hazard_lights: HazardLightsMsg,
    pub gear: GearMsg,
    pub mrm_state: MrmStateMsg,
}

impl From<&HandlerOutput> for HandlerMessages {
    fn from(out: &HandlerOutput) -> Self {
        Self {
            hazard_lights: HazardLightsMsg {
                command: hazard_lights_code(out.hazard_lights),
            },
            gear: GearMsg {
                command: gear_code(out.gear),
            },
            mrm_state: MrmStateMsg::from(&out.mrm_state),
        }
    }
}

/// Messages one planning cycle publishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessages {
    pub turn_indicators: TurnIndicatorsMsg,
    pub hazard_lights: HazardLightsMsg,
}

impl From<&TurnSignalDecision> for SignalMessages {
    fn from(d: &TurnSignalDecision) -> Self {
        Self {
            turn_indicators: TurnIndicatorsMsg {
                command: d.turn_signal.to_code(),
            },
            hazard_lights: HazardLightsMsg {
                command: hazard_lights_code(d.hazard_signal),
            },
        }
    }
}
