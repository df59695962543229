//! Road-network context: lane segments, their adjacency, and the route.

use std::collections::HashMap;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::geometry::{azimuth, point_in_polygon, polyline_length, Pose};

pub type LaneletId = i64;

/// Value of a lane segment's `turn_direction` attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    #[default]
    None,
    Straight,
    Left,
    Right,
}

impl TurnDirection {
    /// Parse the map attribute; unknown values read as `None`.
    pub fn from_attribute(value: &str) -> Self {
        match value {
            "left" => TurnDirection::Left,
            "right" => TurnDirection::Right,
            "straight" => TurnDirection::Straight,
            _ => TurnDirection::None,
        }
    }

    #[inline]
    pub fn requires_signal(self) -> bool {
        matches!(self, TurnDirection::Left | TurnDirection::Right)
    }
}

/// An atomic, directed lane segment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Lanelet {
    pub id: LaneletId,
    pub left_bound: Vec<DVec2>,
    pub right_bound: Vec<DVec2>,
    pub centerline: Vec<DVec2>,
    #[serde(default)]
    pub turn_direction: TurnDirection,
}

impl Lanelet {
    /// Build a lane from its bounds; the centerline is the pointwise midpoint
    /// of the two bounds, which must have the same number of vertices.
    pub fn from_bounds(id: LaneletId, left_bound: Vec<DVec2>, right_bound: Vec<DVec2>) -> Self {
        let centerline = left_bound
            .iter()
            .zip(right_bound.iter())
            .map(|(l, r)| (*l + *r) * 0.5)
            .collect();
        Self {
            id,
            left_bound,
            right_bound,
            centerline,
            turn_direction: TurnDirection::None,
        }
    }

    pub fn with_turn_direction(mut self, turn_direction: TurnDirection) -> Self {
        self.turn_direction = turn_direction;
        self
    }

    /// Closed outline: left bound forward, right bound backward.
    pub fn polygon(&self) -> Vec<DVec2> {
        let mut poly = self.left_bound.clone();
        poly.extend(self.right_bound.iter().rev().copied());
        poly
    }

    pub fn contains(&self, p: DVec2) -> bool {
        point_in_polygon(p, &self.polygon())
    }

    pub fn length(&self) -> f64 {
        polyline_length(&self.centerline)
    }

    /// Entry pose of the centerline.
    pub fn front_pose(&self) -> Option<Pose> {
        match self.centerline.as_slice() {
            [a, b, ..] => Some(Pose {
                position: *a,
                yaw: azimuth(*a, *b),
            }),
            _ => None,
        }
    }

    /// Exit pose of the centerline.
    pub fn back_pose(&self) -> Option<Pose> {
        match self.centerline.as_slice() {
            [.., a, b] => Some(Pose {
                position: *b,
                yaw: azimuth(*a, *b),
            }),
            _ => None,
        }
    }

    fn distance_to_centerline(&self, p: DVec2) -> f64 {
        self.centerline
            .windows(2)
            .map(|w| {
                let ab = w[1] - w[0];
                let len2 = ab.length_squared();
                let t = if len2 > 0.0 {
                    ((p - w[0]).dot(ab) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                p.distance(w[0] + ab * t)
            })
            .fold(f64::MAX, f64::min)
    }
}

/// Road-network queries the decider needs.
pub trait RouteContext {
    fn lanelet(&self, id: LaneletId) -> Option<&Lanelet>;

    /// A same-direction or opposite-direction neighbor exists on the left.
    fn has_left_lane(&self, id: LaneletId) -> bool;

    /// A same-direction or opposite-direction neighbor exists on the right.
    fn has_right_lane(&self, id: LaneletId) -> bool;

    /// Route lanelet containing (or else closest to) `pose`.
    fn closest_lanelet_within_route(&self, pose: &Pose) -> Option<LaneletId>;

    /// Pose the route started from.
    fn original_start_pose(&self) -> Pose;
}

/// In-memory road network.
#[derive(Clone, Debug, Default)]
pub struct RoadNetwork {
    lanelets: HashMap<LaneletId, Lanelet>,
    left: HashMap<LaneletId, LaneletId>,
    right: HashMap<LaneletId, LaneletId>,
    left_opposite: HashMap<LaneletId, Vec<LaneletId>>,
    right_opposite: HashMap<LaneletId, Vec<LaneletId>>,
    route: Vec<LaneletId>,
    start_pose: Pose,
}

impl RoadNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lanelet: Lanelet) {
        self.lanelets.insert(lanelet.id, lanelet);
    }

    /// `left` is the same-direction neighbor on the left of `id` (and `id`
    /// the right neighbor of `left`).
    pub fn set_left_neighbor(&mut self, id: LaneletId, left: LaneletId) {
        self.left.insert(id, left);
        self.right.insert(left, id);
    }

    pub fn add_left_opposite(&mut self, id: LaneletId, opposite: LaneletId) {
        self.left_opposite.entry(id).or_default().push(opposite);
    }

    pub fn add_right_opposite(&mut self, id: LaneletId, opposite: LaneletId) {
        self.right_opposite.entry(id).or_default().push(opposite);
    }

    pub fn set_route(&mut self, route: Vec<LaneletId>, start_pose: Pose) {
        self.route = route;
        self.start_pose = start_pose;
    }

    pub fn route(&self) -> &[LaneletId] {
        &self.route
    }
}

impl RouteContext for RoadNetwork {
    fn lanelet(&self, id: LaneletId) -> Option<&Lanelet> {
        self.lanelets.get(&id)
    }

    fn has_left_lane(&self, id: LaneletId) -> bool {
        self.left.contains_key(&id)
            || self.left_opposite.get(&id).is_some_and(|v| !v.is_empty())
    }

    fn has_right_lane(&self, id: LaneletId) -> bool {
        self.right.contains_key(&id)
            || self.right_opposite.get(&id).is_some_and(|v| !v.is_empty())
    }

    fn closest_lanelet_within_route(&self, pose: &Pose) -> Option<LaneletId> {
        let on_route = self.route.iter().filter_map(|id| self.lanelets.get(id));

        let mut best: Option<(LaneletId, f64)> = None;
        for lane in on_route {
            if lane.contains(pose.position) {
                return Some(lane.id);
            }
            let d = lane.distance_to_centerline(pose.position);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((lane.id, d));
            }
        }
        best.map(|(id, _)| id)
    }

    fn original_start_pose(&self) -> Pose {
        self.start_pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(id: LaneletId, y_right: f64) -> Lanelet {
        Lanelet::from_bounds(
            id,
            vec![DVec2::new(0.0, y_right + 3.5), DVec2::new(50.0, y_right + 3.5)],
            vec![DVec2::new(0.0, y_right), DVec2::new(50.0, y_right)],
        )
    }

    #[test]
    fn neighbors_are_symmetric() {
        let mut net = RoadNetwork::new();
        net.insert(lane(1, 0.0));
        net.insert(lane(2, 3.5));
        net.set_left_neighbor(1, 2);
        assert!(net.has_left_lane(1));
        assert!(net.has_right_lane(2));
        assert!(!net.has_right_lane(1));
        assert!(!net.has_left_lane(2));
    }

    #[test]
    fn closest_route_lane_prefers_containment() {
        let mut net = RoadNetwork::new();
        net.insert(lane(1, 0.0));
        net.insert(lane(2, 3.5));
        net.set_route(vec![1, 2], Pose::default());
        assert_eq!(net.closest_lanelet_within_route(&Pose::new(10.0, 5.0, 0.0)), Some(2));
        assert_eq!(net.closest_lanelet_within_route(&Pose::new(10.0, -9.0, 0.0)), Some(1));
    }

    #[test]
    fn attribute_parsing() {
        assert_eq!(TurnDirection::from_attribute("left"), TurnDirection::Left);
        assert_eq!(TurnDirection::from_attribute("bogus"), TurnDirection::None);
        assert!(!TurnDirection::Straight.requires_signal());
    }
}
