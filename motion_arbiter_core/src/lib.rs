pub mod geometry;
pub mod path;
pub mod lanelet;

pub mod cfg;
pub mod shift;
pub mod signal;
pub mod decider;

pub mod hazard;
pub mod state;
pub mod decide;
pub mod wire;

pub use geometry::Pose;
pub use path::{PathPoint, PathWithLaneId};
pub use lanelet::{Lanelet, LaneletId, RoadNetwork, RouteContext, TurnDirection};

pub use cfg::{EmergencyHandlerCfg, TurnSignalCfg, TurningHazardOn, VehicleShape};
pub use shift::{
    classify_shift, is_near_end_of_return, side_lane_exists, straddles_road_bound, ShiftKind,
    ShiftLine,
};
pub use signal::{
    BehaviorTurnSignal, HazardCommand, IntersectionSignalStatus, SignalCandidate, SignalSource,
    TurnIndicator, TurnSignalDebugData, TurnSignalDecision,
};
pub use decider::{use_prior_turn_signal, BehaviorSignalInput, DesiredStartMemo, TurnSignalDecider};

pub use hazard::{BehaviorStatus, ControlMode, HazardLevel, HazardStatus, HazardStatusStamped};
pub use state::{MrmBehavior, MrmState, OperationState};
pub use decide::{
    decide_mrm, effective_level, gear_command, hazard_lights_command, is_emergency, is_stopped,
    next_operation_state, select_behavior, BehaviorChange, GearCommand, MrmInputs, MrmStep,
    STOPPED_VELOCITY_THRESHOLD,
};
pub use wire::{DecodeError, WireCode};
