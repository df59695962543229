//! Turn-signal command values and the candidates the decider arbitrates.

use serde::{Deserialize, Serialize};

use crate::geometry::Pose;
use crate::lanelet::TurnDirection;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnIndicator {
    #[default]
    NoCommand,
    /// Indicators explicitly off.
    None,
    /// Going straight through a junction: indicators off.
    Straight,
    Left,
    Right,
}

impl TurnIndicator {
    /// Left or right blinker requested.
    #[inline]
    pub fn is_enabled(self) -> bool {
        matches!(self, TurnIndicator::Left | TurnIndicator::Right)
    }

    /// No command, or an explicit "off".
    #[inline]
    pub fn is_inactive(self) -> bool {
        !self.is_enabled()
    }
}

impl From<TurnDirection> for TurnIndicator {
    fn from(dir: TurnDirection) -> Self {
        match dir {
            TurnDirection::Left => TurnIndicator::Left,
            TurnDirection::Right => TurnIndicator::Right,
            TurnDirection::Straight => TurnIndicator::Straight,
            TurnDirection::None => TurnIndicator::None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HazardCommand {
    #[default]
    NoCommand,
    Enable,
}

/// One turn-signal request.
///
/// `required_start..required_end` is the span of path in which the signal
/// must be on; `desired_start..desired_end` is the wider span in which it may
/// start early. Poses are meaningless when `turn_signal` is `NoCommand` and
/// `hazard_signal` is `NoCommand`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub turn_signal: TurnIndicator,
    pub hazard_signal: HazardCommand,
    pub desired_start: Pose,
    pub desired_end: Pose,
    pub required_start: Pose,
    pub required_end: Pose,
}

impl SignalCandidate {
    /// Carries neither a turn nor a hazard command.
    pub fn is_empty(&self) -> bool {
        self.turn_signal == TurnIndicator::NoCommand && self.hazard_signal == HazardCommand::NoCommand
    }
}

/// Result of the behavior candidate builder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTurnSignal {
    pub info: SignalCandidate,
    /// Callers should drop any signal they carried over from a previous
    /// shift: the maneuver no longer warrants one.
    pub is_ignore: bool,
}

impl BehaviorTurnSignal {
    pub(crate) fn none(is_ignore: bool) -> Self {
        Self {
            info: SignalCandidate::default(),
            is_ignore,
        }
    }
}

/// Both raw candidates of one cycle, untouched by arbitration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSignalDebugData {
    pub intersection: Option<SignalCandidate>,
    pub behavior: SignalCandidate,
}

/// Where ego stands relative to the intersection candidate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntersectionSignalStatus {
    /// Inside the required span: the intersection blinker is on.
    pub turn_signal_active: bool,
    /// Inside the desired span but short of the required start.
    pub approaching: bool,
    pub distance_to_required_start: f64,
    pub required_start: Pose,
}

impl Default for IntersectionSignalStatus {
    fn default() -> Self {
        Self {
            turn_signal_active: false,
            approaching: false,
            distance_to_required_start: f64::MAX,
            required_start: Pose::default(),
        }
    }
}

/// Which candidate arbitration picked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalSource {
    #[default]
    Neither,
    Intersection,
    Behavior,
    /// A command held over from an earlier cycle.
    Held,
}

/// Per-cycle output of the decider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSignalDecision {
    pub turn_signal: TurnIndicator,
    pub hazard_signal: HazardCommand,
    pub source: SignalSource,
    pub intersection: IntersectionSignalStatus,
    pub debug: TurnSignalDebugData,
}
