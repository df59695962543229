//! One tick of the MRM escalation machine, minus the IO.
//!
//! `decide_mrm` advances `MrmState` and reports which behavior services have
//! to be cancelled/activated; the caller owns the service calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cfg::EmergencyHandlerCfg;
use crate::hazard::{ControlMode, HazardLevel, HazardStatus};
use crate::signal::HazardCommand;
use crate::state::{MrmBehavior, MrmState, OperationState};

/// Speed [m/s] below which ego counts as stopped. Reverse motion counts too.
pub const STOPPED_VELOCITY_THRESHOLD: f64 = 0.001;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GearCommand {
    #[default]
    Drive,
    Park,
}

/// Snapshot values one tick decides on.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MrmInputs {
    pub hazard: HazardStatus,
    /// No hazard report within the configured timeout.
    pub is_stale: bool,
    pub control_mode: ControlMode,
    pub speed: f64,
}

/// Service calls a tick asks for, in order: cancel first, then activate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorChange {
    pub cancel: Option<MrmBehavior>,
    pub activate: Option<MrmBehavior>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrmStep {
    pub hazard_lights: HazardCommand,
    pub gear: GearCommand,
    pub behavior_change: Option<BehaviorChange>,
}

#[inline]
pub fn is_stopped(speed: f64) -> bool {
    speed < STOPPED_VELOCITY_THRESHOLD
}

#[inline]
pub fn is_emergency(status: &HazardStatus, is_stale: bool) -> bool {
    status.emergency || status.emergency_holding || is_stale
}

/// Severity to act on: a stale report reads as the worst fault.
#[inline]
pub fn effective_level(status: &HazardStatus, is_stale: bool) -> HazardLevel {
    if is_stale {
        HazardLevel::SinglePointFault
    } else {
        status.level
    }
}

/// Next operation state, or `None` to hold.
pub fn next_operation_state(
    state: OperationState,
    is_autonomous: bool,
    is_emergency: bool,
    is_stopped: bool,
) -> Option<OperationState> {
    match state {
        OperationState::Normal => {
            (is_autonomous && is_emergency).then_some(OperationState::Operating)
        }
        _ if !is_emergency => Some(OperationState::Normal),
        OperationState::Operating => is_stopped.then_some(OperationState::Succeeded),
        OperationState::Succeeded | OperationState::Failed => None,
    }
}

/// Behavior to run while operating. Only escalates.
pub fn select_behavior(
    current: MrmBehavior,
    level: HazardLevel,
    use_comfortable_stop: bool,
) -> MrmBehavior {
    match (current, level) {
        (MrmBehavior::None, HazardLevel::LatentFault) if use_comfortable_stop => {
            MrmBehavior::ComfortableStop
        }
        (MrmBehavior::None, HazardLevel::LatentFault) => MrmBehavior::EmergencyStop,
        (MrmBehavior::None, HazardLevel::SinglePointFault) => MrmBehavior::EmergencyStop,
        (MrmBehavior::ComfortableStop, HazardLevel::SinglePointFault) => {
            MrmBehavior::EmergencyStop
        }
        (current, _) => current,
    }
}

pub fn hazard_lights_command(inputs: &MrmInputs, cfg: &EmergencyHandlerCfg) -> HazardCommand {
    if inputs.hazard.emergency_holding {
        return HazardCommand::Enable;
    }
    if is_emergency(&inputs.hazard, inputs.is_stale) && cfg.turning_hazard_on.emergency {
        return HazardCommand::Enable;
    }
    HazardCommand::NoCommand
}

pub fn gear_command(inputs: &MrmInputs, cfg: &EmergencyHandlerCfg) -> GearCommand {
    if cfg.use_parking_after_stopped && is_stopped(inputs.speed) {
        GearCommand::Park
    } else {
        GearCommand::Drive
    }
}

fn change_between(old: MrmBehavior, new: MrmBehavior) -> Option<BehaviorChange> {
    if old == new {
        return None;
    }
    Some(BehaviorChange {
        cancel: (old != MrmBehavior::None).then_some(old),
        activate: (new != MrmBehavior::None).then_some(new),
    })
}

/// Transition, then behavior bookkeeping, then the vehicle commands.
pub fn decide_mrm(
    inputs: &MrmInputs,
    cfg: &EmergencyHandlerCfg,
    state: &mut MrmState,
    now: Duration,
) -> MrmStep {
    let emergency = is_emergency(&inputs.hazard, inputs.is_stale);
    let stopped = is_stopped(inputs.speed);

    if let Some(next) = next_operation_state(
        state.state,
        inputs.control_mode.is_autonomous(),
        emergency,
        stopped,
    ) {
        state.transition_to(next, now);
    }

    let behavior_change = match state.state {
        OperationState::Normal => {
            let change = change_between(state.behavior, MrmBehavior::None);
            state.behavior = MrmBehavior::None;
            change
        }
        OperationState::Operating => {
            let level = effective_level(&inputs.hazard, inputs.is_stale);
            let next = select_behavior(state.behavior, level, cfg.use_comfortable_stop);
            let change = change_between(state.behavior, next);
            state.behavior = next;
            change
        }
        OperationState::Succeeded | OperationState::Failed => None,
    };

    MrmStep {
        hazard_lights: hazard_lights_command(inputs, cfg),
        gear: gear_command(inputs, cfg),
        behavior_change,
    }
}
