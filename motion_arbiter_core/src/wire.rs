//! Numeric codes used on the middleware boundary.

use thiserror::Error;

use crate::decide::GearCommand;
use crate::hazard::{BehaviorStatus, ControlMode, HazardLevel};
use crate::signal::{HazardCommand, TurnIndicator};
use crate::state::{MrmBehavior, OperationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid hazard level code {0}")]
    HazardLevel(u8),
    #[error("invalid control mode code {0}")]
    ControlMode(u8),
    #[error("invalid behavior status code {0}")]
    BehaviorStatus(u8),
    #[error("invalid MRM state code {0}")]
    MrmState(u8),
    #[error("invalid MRM behavior code {0}")]
    MrmBehavior(u8),
    #[error("invalid turn indicator code {0}")]
    TurnIndicator(u8),
}

/// Map an enum to and from its wire code.
pub trait WireCode: Sized {
    fn to_code(self) -> u8;
    fn from_code(code: u8) -> Result<Self, DecodeError>;
}

impl WireCode for HazardLevel {
    fn to_code(self) -> u8 {
        match self {
            HazardLevel::NoFault => 0,
            HazardLevel::SafeFault => 1,
            HazardLevel::LatentFault => 2,
            HazardLevel::SinglePointFault => 3,
        }
    }

    fn from_code(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            0 => HazardLevel::NoFault,
            1 => HazardLevel::SafeFault,
            2 => HazardLevel::LatentFault,
            3 => HazardLevel::SinglePointFault,
            _ => return Err(DecodeError::HazardLevel(code)),
        })
    }
}

impl WireCode for ControlMode {
    fn to_code(self) -> u8 {
        match self {
            ControlMode::NoCommand => 0,
            ControlMode::Autonomous => 1,
            ControlMode::SteerOnly => 2,
            ControlMode::VelocityOnly => 3,
            ControlMode::Manual => 4,
            ControlMode::Disengaged => 5,
            ControlMode::NotReady => 6,
        }
    }

    fn from_code(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            0 => ControlMode::NoCommand,
            1 => ControlMode::Autonomous,
            2 => ControlMode::SteerOnly,
            3 => ControlMode::VelocityOnly,
            4 => ControlMode::Manual,
            5 => ControlMode::Disengaged,
            6 => ControlMode::NotReady,
            _ => return Err(DecodeError::ControlMode(code)),
        })
    }
}

impl WireCode for BehaviorStatus {
    fn to_code(self) -> u8 {
        match self {
            BehaviorStatus::NotAvailable => 0,
            BehaviorStatus::Available => 1,
            BehaviorStatus::Operating => 2,
            BehaviorStatus::Succeeded => 3,
            BehaviorStatus::Failed => 4,
        }
    }

    fn from_code(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            0 => BehaviorStatus::NotAvailable,
            1 => BehaviorStatus::Available,
            2 => BehaviorStatus::Operating,
            3 => BehaviorStatus::Succeeded,
            4 => BehaviorStatus::Failed,
            _ => return Err(DecodeError::BehaviorStatus(code)),
        })
    }
}

// 0 is UNKNOWN on the wire and never a valid state.
impl WireCode for OperationState {
    fn to_code(self) -> u8 {
        match self {
            OperationState::Normal => 1,
            OperationState::Operating => 2,
            OperationState::Succeeded => 3,
            OperationState::Failed => 4,
        }
    }

    fn from_code(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            1 => OperationState::Normal,
            2 => OperationState::Operating,
            3 => OperationState::Succeeded,
            4 => OperationState::Failed,
            _ => return Err(DecodeError::MrmState(code)),
        })
    }
}

impl WireCode for MrmBehavior {
    fn to_code(self) -> u8 {
        match self {
            MrmBehavior::None => 1,
            MrmBehavior::EmergencyStop => 2,
            MrmBehavior::ComfortableStop => 3,
        }
    }

    fn from_code(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            1 => MrmBehavior::None,
            2 => MrmBehavior::EmergencyStop,
            3 => MrmBehavior::ComfortableStop,
            _ => return Err(DecodeError::MrmBehavior(code)),
        })
    }
}

/// `None` and `Straight` share the DISABLE code and decode as `None`.
impl WireCode for TurnIndicator {
    fn to_code(self) -> u8 {
        match self {
            TurnIndicator::NoCommand => 0,
            TurnIndicator::None | TurnIndicator::Straight => 1,
            TurnIndicator::Left => 2,
            TurnIndicator::Right => 3,
        }
    }

    fn from_code(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            0 => TurnIndicator::NoCommand,
            1 => TurnIndicator::None,
            2 => TurnIndicator::Left,
            3 => TurnIndicator::Right,
            _ => return Err(DecodeError::TurnIndicator(code)),
        })
    }
}

pub const GEAR_DRIVE: u8 = 2;
pub const GEAR_PARK: u8 = 22;

pub const HAZARD_LIGHTS_NO_COMMAND: u8 = 0;
pub const HAZARD_LIGHTS_ENABLE: u8 = 2;

pub fn gear_code(gear: GearCommand) -> u8 {
    match gear {
        GearCommand::Drive => GEAR_DRIVE,
        GearCommand::Park => GEAR_PARK,
    }
}

pub fn hazard_lights_code(cmd: HazardCommand) -> u8 {
    match cmd {
        HazardCommand::NoCommand => HAZARD_LIGHTS_NO_COMMAND,
        HazardCommand::Enable => HAZARD_LIGHTS_ENABLE,
    }
}
