//! Turn-signal arbitration.
//!
//! Two independent requests compete every planning cycle: one derived from
//! the next turning lane on the route (intersection candidate) and one derived
//! from the planned lateral shift (behavior candidate). The decider picks one
//! command, measuring every distance along the current path, and holds an
//! emitted blinker until ego leaves the required span it was issued in.

use std::collections::{BTreeMap, VecDeque};

use glam::DVec2;
use tracing::{debug, warn};

use crate::cfg::{TurnSignalCfg, VehicleShape};
use crate::geometry::{azimuth, interpolate_polyline, normalize_radian, polyline_length, Pose};
use crate::lanelet::{Lanelet, LaneletId, RouteContext};
use crate::path::PathWithLaneId;
use crate::shift::{
    classify_shift, is_near_end_of_return, side_lane_exists, straddles_road_bound, ShiftKind,
    ShiftLine,
};
use crate::signal::{
    BehaviorTurnSignal, HazardCommand, IntersectionSignalStatus, SignalCandidate, SignalSource,
    TurnIndicator, TurnSignalDebugData, TurnSignalDecision,
};

/// Ego counts as done shifting once within this lateral distance [m] of the
/// target shift.
const SHIFT_DONE_THRESHOLD: f64 = 0.1;
/// Below this speed [m/s] the near-end-of-return check applies.
const EGO_STOPPED_SPEED: f64 = 0.1;
const CENTERLINE_RESAMPLE_INTERVAL: f64 = 1.0;
const RESAMPLE_OVERLAP_THRESHOLD: f64 = 0.1;

/// Lane id -> ego pose when that turning lane was first detected.
pub type DesiredStartMemo = BTreeMap<LaneletId, Pose>;

/// Everything the behavior candidate builder looks at.
#[derive(Clone, Copy, Debug)]
pub struct BehaviorSignalInput<'a> {
    /// Path after applying the shift.
    pub path: &'a PathWithLaneId,
    pub shift_line: &'a ShiftLine,
    /// Lanes ego drives in before the shift.
    pub current_lanelets: &'a [LaneletId],
    pub ego_pose: Pose,
    pub ego_speed: f64,
    pub current_shift_length: f64,
    pub is_driving_forward: bool,
    /// The shift is measured from ego's own lane rather than the target lane.
    pub egos_lane_is_shifted: bool,
    pub override_ego_stopped_check: bool,
}

/// Signed distances from ego to one candidate's four poses. Start distances
/// are measured from the vehicle front.
#[derive(Clone, Copy, Debug)]
struct SpanDistances {
    desired_start: f64,
    desired_end: f64,
    required_start: f64,
    required_end: f64,
}

#[derive(Clone, Copy, Debug)]
struct HeldSignal {
    command: TurnIndicator,
    required_end: Pose,
}

/// Decide whether the prior request keeps the blinker over a subsequent one.
///
/// "Prior" is the request whose required span starts first. Arguments are
/// signed distances from ego to each required span's start and end.
pub fn use_prior_turn_signal(
    dist_to_prior_required_start: f64,
    dist_to_prior_required_end: f64,
    dist_to_subsequent_required_start: f64,
    dist_to_subsequent_required_end: f64,
) -> bool {
    let before_prior_required = dist_to_prior_required_start > 0.0;
    let before_subsequent_required = dist_to_subsequent_required_start > 0.0;
    let inside_prior_required =
        dist_to_prior_required_start < 0.0 && 0.0 <= dist_to_prior_required_end;

    if dist_to_prior_required_start < dist_to_subsequent_required_start {
        // subsequent span nested inside the prior one
        if dist_to_subsequent_required_end < dist_to_prior_required_end {
            return true;
        }
        if before_prior_required || inside_prior_required {
            return true;
        }
        // between the two spans
        if before_subsequent_required {
            return true;
        }
        return false;
    }

    // prior span nested inside the subsequent one
    if dist_to_prior_required_end < dist_to_subsequent_required_end {
        return before_prior_required || inside_prior_required;
    }

    !before_prior_required
}

#[derive(Clone, Debug)]
pub struct TurnSignalDecider {
    cfg: TurnSignalCfg,
    vehicle: VehicleShape,
    desired_start_memo: DesiredStartMemo,
    held: Option<HeldSignal>,
}

impl TurnSignalDecider {
    pub fn new(cfg: TurnSignalCfg, vehicle: VehicleShape) -> Self {
        Self {
            cfg,
            vehicle,
            desired_start_memo: DesiredStartMemo::new(),
            held: None,
        }
    }

    pub fn cfg(&self) -> &TurnSignalCfg {
        &self.cfg
    }

    pub fn desired_start_memo(&self) -> &DesiredStartMemo {
        &self.desired_start_memo
    }

    /// Forget anchored desired starts and any held command (new route).
    pub fn reset(&mut self) {
        self.desired_start_memo.clear();
        self.held = None;
    }

    /// One planning cycle: build the intersection candidate, arbitrate it
    /// against `behavior`, and apply the hold on the previous command.
    pub fn get_turn_signal<R: RouteContext + ?Sized>(
        &mut self,
        route: &R,
        path: &PathWithLaneId,
        behavior: &SignalCandidate,
        current_pose: &Pose,
        current_vel: f64,
    ) -> TurnSignalDecision {
        let mut decision = TurnSignalDecision {
            hazard_signal: behavior.hazard_signal,
            debug: TurnSignalDebugData {
                intersection: None,
                behavior: *behavior,
            },
            ..TurnSignalDecision::default()
        };

        let Some(seg) = self.ego_segment(path, current_pose) else {
            self.held = None;
            return decision;
        };

        let intersection = self.intersection_candidate(route, path, current_pose, current_vel, seg);
        decision.debug.intersection = intersection;

        let behavior_source = if behavior.turn_signal == TurnIndicator::NoCommand {
            SignalSource::Neither
        } else {
            SignalSource::Behavior
        };

        let (command, source, winner) = match intersection {
            None => (behavior.turn_signal, behavior_source, Some(*behavior)),
            Some(inter) if behavior.turn_signal.is_inactive() => {
                decision.intersection = self.intersection_status(path, current_pose, seg, &inter);
                (inter.turn_signal, SignalSource::Intersection, Some(inter))
            }
            Some(inter) => match self.resolve_turn_signal(path, current_pose, seg, &inter, behavior).1 {
                SignalSource::Intersection => {
                    decision.intersection =
                        self.intersection_status(path, current_pose, seg, &inter);
                    (inter.turn_signal, SignalSource::Intersection, Some(inter))
                }
                SignalSource::Behavior => (behavior.turn_signal, SignalSource::Behavior, Some(*behavior)),
                _ => (TurnIndicator::NoCommand, SignalSource::Neither, None),
            },
        };

        let requested = [
            behavior.turn_signal,
            intersection.map_or(TurnIndicator::NoCommand, |c| c.turn_signal),
        ];
        let (turn_signal, source) =
            self.apply_hold(path, current_pose, seg, command, source, winner.as_ref(), requested);
        decision.turn_signal = turn_signal;
        decision.source = source;
        decision
    }

    /// Pick between an intersection and a behavior candidate by where ego
    /// stands relative to their desired and required spans.
    pub fn resolve_turn_signal(
        &self,
        path: &PathWithLaneId,
        current_pose: &Pose,
        current_seg_idx: usize,
        intersection: &SignalCandidate,
        behavior: &SignalCandidate,
    ) -> (TurnIndicator, SignalSource) {
        let inter = self.span_distances(path, current_pose, current_seg_idx, intersection);
        let beh = self.span_distances(path, current_pose, current_seg_idx, behavior);

        let pick = |source: SignalSource| match source {
            SignalSource::Intersection => (intersection.turn_signal, source),
            SignalSource::Behavior => (behavior.turn_signal, source),
            _ => (TurnIndicator::NoCommand, SignalSource::Neither),
        };

        // neither desired span reached yet
        if inter.desired_start > 0.0 && beh.desired_start > 0.0 {
            return pick(SignalSource::Neither);
        }
        if inter.desired_start > 0.0 {
            return pick(SignalSource::Behavior);
        }
        if beh.desired_start > 0.0 {
            return pick(SignalSource::Intersection);
        }

        let intersection_passed = inter.desired_end < 0.0;
        let behavior_passed = beh.desired_end < 0.0;
        if intersection_passed && behavior_passed {
            return pick(SignalSource::Neither);
        }
        if intersection_passed {
            return pick(SignalSource::Behavior);
        }
        if behavior_passed {
            return pick(SignalSource::Intersection);
        }

        if inter.required_start < beh.required_start {
            if use_prior_turn_signal(
                inter.required_start,
                inter.required_end,
                beh.required_start,
                beh.required_end,
            ) {
                return pick(SignalSource::Intersection);
            }
            return pick(SignalSource::Behavior);
        }

        if use_prior_turn_signal(
            beh.required_start,
            beh.required_end,
            inter.required_start,
            inter.required_end,
        ) {
            return pick(SignalSource::Behavior);
        }
        pick(SignalSource::Intersection)
    }

    /// Merge two candidates into one with the same distance rules as
    /// arbitration. Used by callers that layer several signal sources.
    pub fn use_prior_turn_signal_info(
        &self,
        path: &PathWithLaneId,
        current_pose: &Pose,
        current_seg_idx: usize,
        original: &SignalCandidate,
        new: &SignalCandidate,
    ) -> SignalCandidate {
        let o = self.span_distances(path, current_pose, current_seg_idx, original);
        let n = self.span_distances(path, current_pose, current_seg_idx, new);

        if o.desired_start > 0.0 && n.desired_start > 0.0 {
            return SignalCandidate::default();
        }
        if o.desired_start > 0.0 {
            return *new;
        }
        if n.desired_start > 0.0 {
            return *original;
        }

        if o.desired_end < 0.0 && n.desired_end < 0.0 {
            return SignalCandidate::default();
        }
        if o.desired_end < 0.0 {
            return *new;
        }
        if n.desired_end < 0.0 {
            return *original;
        }

        if o.required_start <= n.required_start {
            if use_prior_turn_signal(o.required_start, o.required_end, n.required_start, n.required_end) {
                return *original;
            }
            return *new;
        }

        if use_prior_turn_signal(n.required_start, n.required_end, o.required_start, o.required_end) {
            return *new;
        }
        *original
    }

    /// Build the behavior candidate for a planned lateral shift.
    pub fn get_behavior_turn_signal_info<R: RouteContext + ?Sized>(
        &self,
        route: &R,
        input: &BehaviorSignalInput<'_>,
    ) -> BehaviorTurnSignal {
        let cfg = &self.cfg;
        let path = input.path;
        let shift_line = input.shift_line;

        if !input.is_driving_forward {
            let back_start = route.original_start_pose();
            let info = SignalCandidate {
                turn_signal: TurnIndicator::NoCommand,
                hazard_signal: HazardCommand::Enable,
                desired_start: back_start,
                desired_end: input.ego_pose,
                required_start: back_start,
                required_end: input.ego_pose,
            };
            return BehaviorTurnSignal {
                info,
                is_ignore: false,
            };
        }

        if shift_line.start_idx >= path.len() || shift_line.end_idx >= path.len() {
            warn!(
                start_idx = shift_line.start_idx,
                end_idx = shift_line.end_idx,
                path_len = path.len(),
                "shift line index out of path range"
            );
            return BehaviorTurnSignal::none(false);
        }

        // measured from the target lane: flip into ego's frame
        let (start_shift, end_shift) = if input.egos_lane_is_shifted {
            (shift_line.start_shift_length, shift_line.end_shift_length)
        } else {
            (shift_line.end_shift_length, -shift_line.start_shift_length)
        };
        let relative_shift = end_shift - start_shift;

        if relative_shift.abs() < cfg.shift_length_threshold {
            return BehaviorTurnSignal::none(true);
        }

        let kind = classify_shift(start_shift, end_shift, cfg.shift_length_threshold);
        if kind == ShiftKind::None {
            debug!(start_shift, end_shift, "shift is not a signalled maneuver");
            return BehaviorTurnSignal::none(true);
        }

        if (end_shift - input.current_shift_length).abs() < SHIFT_DONE_THRESHOLD {
            return BehaviorTurnSignal::none(true);
        }

        let ego_seg = path
            .find_nearest_segment_index(input.ego_pose.position)
            .unwrap_or(0);
        let signal_prepare_distance =
            (input.ego_speed * cfg.search_time).max(cfg.minimum_search_distance);
        let ego_front_to_shift_start = path.signed_arc_length_to_index(
            input.ego_pose.position,
            ego_seg,
            shift_line.start_idx,
        ) - self.vehicle.base_link_to_front;

        if signal_prepare_distance < ego_front_to_shift_start {
            return BehaviorTurnSignal::none(false);
        }

        let required_start = path.points[shift_line.start_idx].pose;
        let required_end = path.points[shift_line.end_idx].pose;
        let desired_start = if ego_front_to_shift_start > 0.0 {
            path.pose_at_arc_length(path.arc_length_to(shift_line.start_idx) - cfg.desired_lead_margin)
                .unwrap_or(required_start)
        } else {
            required_start
        };

        let info = SignalCandidate {
            turn_signal: if relative_shift > 0.0 {
                TurnIndicator::Left
            } else {
                TurnIndicator::Right
            },
            hazard_signal: HazardCommand::NoCommand,
            desired_start,
            desired_end: required_end,
            required_start,
            required_end,
        };

        if !cfg.on_swerving {
            return BehaviorTurnSignal {
                info,
                is_ignore: false,
            };
        }

        let query_pose = if input.egos_lane_is_shifted {
            required_end
        } else {
            required_start
        };
        let Some(lane_id) = route.closest_lanelet_within_route(&query_pose) else {
            debug!("no route lane near the shift");
            return BehaviorTurnSignal::none(true);
        };

        let has_left_lane = route.has_left_lane(lane_id);
        let has_right_lane = route.has_right_lane(lane_id);
        if !side_lane_exists(kind, relative_shift, has_left_lane, has_right_lane) {
            debug!(?kind, relative_shift, has_left_lane, has_right_lane, "no lane on the shift side");
            return BehaviorTurnSignal::none(true);
        }

        let lanes: Vec<&Lanelet> = input
            .current_lanelets
            .iter()
            .filter_map(|id| route.lanelet(*id))
            .collect();

        // a return that ego has all but finished may clip the bound it is
        // leaving; only judge the near-end while ego is (almost) stopped
        let check_near_end = input.ego_speed < EGO_STOPPED_SPEED && !input.override_ego_stopped_check;
        let near_end = check_near_end && is_near_end_of_return(kind, input.ego_pose.position, &lanes);
        if !near_end && straddles_road_bound(path, shift_line, &lanes, &self.vehicle) {
            debug!(?kind, "shift would straddle a road bound");
            return BehaviorTurnSignal::none(true);
        }

        BehaviorTurnSignal {
            info,
            is_ignore: false,
        }
    }

    fn ego_segment(&self, path: &PathWithLaneId, pose: &Pose) -> Option<usize> {
        path.find_nearest_segment_index_with_soft_constraints(
            pose,
            self.cfg.nearest_dist_threshold,
            self.cfg.nearest_yaw_threshold,
        )
    }

    fn distance_to(&self, path: &PathWithLaneId, pose: &Pose, seg: usize, target: &Pose) -> f64 {
        let target_seg = self.ego_segment(path, target).unwrap_or(0);
        path.signed_arc_length(pose.position, seg, target.position, target_seg)
    }

    fn span_distances(
        &self,
        path: &PathWithLaneId,
        pose: &Pose,
        seg: usize,
        info: &SignalCandidate,
    ) -> SpanDistances {
        let front = self.vehicle.base_link_to_front;
        SpanDistances {
            desired_start: self.distance_to(path, pose, seg, &info.desired_start) - front,
            desired_end: self.distance_to(path, pose, seg, &info.desired_end),
            required_start: self.distance_to(path, pose, seg, &info.required_start) - front,
            required_end: self.distance_to(path, pose, seg, &info.required_end),
        }
    }

    fn intersection_candidate<R: RouteContext + ?Sized>(
        &mut self,
        route: &R,
        path: &PathWithLaneId,
        pose: &Pose,
        vel: f64,
        seg: usize,
    ) -> Option<SignalCandidate> {
        let search_distance = (vel * self.cfg.intersection_search_time)
            .min(self.cfg.intersection_search_distance);
        let upcoming = path.lane_ids_from(seg);

        let mut queue: VecDeque<SignalCandidate> = VecDeque::new();
        for &id in &upcoming {
            let Some(lane) = route.lanelet(id) else {
                continue;
            };
            let (Some(front), Some(back)) = (lane.front_pose(), lane.back_pose()) else {
                continue;
            };

            let dist_to_front =
                self.distance_to(path, pose, seg, &front) - self.vehicle.base_link_to_front;
            let dist_to_back = self.distance_to(path, pose, seg, &back);

            if dist_to_back < 0.0 {
                continue;
            }
            if search_distance <= dist_to_front {
                break;
            }
            if !lane.turn_direction.requires_signal() {
                continue;
            }

            let desired_start = *self.desired_start_memo.entry(id).or_insert(*pose);
            let required_end = self.required_end_point(&lane.centerline).unwrap_or(back);
            queue.push_back(SignalCandidate {
                turn_signal: lane.turn_direction.into(),
                hazard_signal: HazardCommand::NoCommand,
                desired_start,
                desired_end: back,
                required_start: front,
                required_end,
            });
        }

        self.desired_start_memo.retain(|id, _| upcoming.contains(id));

        // first turn whose required span is not behind ego yet
        while let Some(candidate) = queue.pop_front() {
            if queue.is_empty() || self.distance_to(path, pose, seg, &candidate.required_end) >= 0.0 {
                return Some(candidate);
            }
        }
        None
    }

    /// First centerline pose (resampled at 1 m) whose heading is within the
    /// angle threshold of the lane's exit heading.
    fn required_end_point(&self, centerline: &[DVec2]) -> Option<Pose> {
        if centerline.len() < 2 {
            return None;
        }

        let length = polyline_length(centerline);
        let mut arclengths: Vec<f64> = (0u32..)
            .map(|k| f64::from(k) * CENTERLINE_RESAMPLE_INTERVAL)
            .take_while(|s| *s < length)
            .collect();
        match arclengths.last_mut() {
            Some(last) if length - *last < RESAMPLE_OVERLAP_THRESHOLD => *last = length,
            _ => arclengths.push(length),
        }

        let points: Vec<DVec2> = arclengths
            .iter()
            .filter_map(|s| interpolate_polyline(centerline, *s))
            .collect();
        if points.len() < 2 {
            return points.first().map(|p| Pose {
                position: *p,
                yaw: azimuth(centerline[0], centerline[centerline.len() - 1]),
            });
        }

        let yaw_at = |i: usize| {
            if i + 1 < points.len() {
                azimuth(points[i], points[i + 1])
            } else {
                azimuth(points[i - 1], points[i])
            }
        };
        let terminal_yaw = yaw_at(points.len() - 1);
        let threshold = self.cfg.intersection_angle_threshold_deg.to_radians();

        let idx = (0..points.len())
            .find(|&i| normalize_radian(yaw_at(i) - terminal_yaw).abs() < threshold)
            .unwrap_or(points.len() - 1);
        Some(Pose {
            position: points[idx],
            yaw: yaw_at(idx),
        })
    }

    fn intersection_status(
        &self,
        path: &PathWithLaneId,
        pose: &Pose,
        seg: usize,
        intersection: &SignalCandidate,
    ) -> IntersectionSignalStatus {
        let d = self.span_distances(path, pose, seg, intersection);
        if d.desired_start < 0.0 && d.desired_end > 0.0 {
            IntersectionSignalStatus {
                turn_signal_active: d.required_start <= 0.0,
                approaching: d.required_start > 0.0,
                distance_to_required_start: d.required_start,
                required_start: intersection.required_start,
            }
        } else {
            IntersectionSignalStatus::default()
        }
    }

    /// Keep the previously emitted blinker until ego passes the end of the
    /// required span it was emitted in. The hold is dropped as soon as no raw
    /// candidate asks for a blinker at all.
    #[allow(clippy::too_many_arguments)]
    fn apply_hold(
        &mut self,
        path: &PathWithLaneId,
        pose: &Pose,
        seg: usize,
        command: TurnIndicator,
        source: SignalSource,
        winner: Option<&SignalCandidate>,
        requested: [TurnIndicator; 2],
    ) -> (TurnIndicator, SignalSource) {
        if let Some(held) = self.held {
            let still_requested = requested.iter().any(|c| c.is_enabled());
            if !still_requested {
                debug!(held = ?held.command, "no candidate left, releasing held turn signal");
            } else if self.distance_to(path, pose, seg, &held.required_end) >= 0.0 {
                if held.command != command {
                    debug!(held = ?held.command, candidate = ?command, "holding previous turn signal");
                    return (held.command, SignalSource::Held);
                }
                return (command, source);
            }
            self.held = None;
        }

        if let Some(w) = winner {
            if command.is_enabled() && w.turn_signal == command {
                let d = self.span_distances(path, pose, seg, w);
                if d.required_start <= 0.0 && d.required_end >= 0.0 {
                    self.held = Some(HeldSignal {
                        command,
                        required_end: w.required_end,
                    });
                }
            }
        }
        (command, source)
    }
}
