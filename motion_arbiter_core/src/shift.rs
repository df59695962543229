//! Lateral shift classification and the feasibility predicates that gate a
//! behavior turn signal. All functions here are pure.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::cfg::VehicleShape;
use crate::geometry::polyline_intersects_polygon;
use crate::lanelet::Lanelet;
use crate::path::PathWithLaneId;

/// A planned lateral offset over `[start_idx, end_idx)` of a path.
/// Shift lengths are signed, positive to the left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftLine {
    pub start_idx: usize,
    pub end_idx: usize,
    pub start_shift_length: f64,
    pub end_shift_length: f64,
}

impl ShiftLine {
    #[inline]
    pub fn relative_shift(&self) -> f64 {
        self.end_shift_length - self.start_shift_length
    }

    pub fn kind(&self, threshold: f64) -> ShiftKind {
        classify_shift(self.start_shift_length, self.end_shift_length, threshold)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftKind {
    /// Both ends within the threshold: no maneuver.
    None,
    /// From the reference line out to an offset.
    Avoid,
    /// From an offset back to the reference line.
    Return,
    /// Between two offsets, both on the left.
    LeftMiddle,
    /// Between two offsets, both on the right.
    RightMiddle,
}

pub fn classify_shift(start: f64, end: f64, threshold: f64) -> ShiftKind {
    if start.abs() < threshold && end.abs() > threshold {
        ShiftKind::Avoid
    } else if start.abs() > threshold && end.abs() < threshold {
        ShiftKind::Return
    } else if start > threshold && end > threshold {
        ShiftKind::LeftMiddle
    } else if start < -threshold && end < -threshold {
        ShiftKind::RightMiddle
    } else {
        ShiftKind::None
    }
}

/// False when the maneuver points toward a side with no adjacent lane, in
/// which case no blinker is needed.
pub fn side_lane_exists(
    kind: ShiftKind,
    relative_shift: f64,
    has_left_lane: bool,
    has_right_lane: bool,
) -> bool {
    let toward_left = relative_shift > 0.0;
    let toward_right = relative_shift < 0.0;

    match kind {
        ShiftKind::Avoid => {
            !(toward_left && !has_left_lane) && !(toward_right && !has_right_lane)
        }
        // a left-moving return comes back from the right side, and vice versa
        ShiftKind::Return => {
            !(toward_left && !has_right_lane) && !(toward_right && !has_left_lane)
        }
        ShiftKind::LeftMiddle => !((toward_left || toward_right) && !has_left_lane),
        ShiftKind::RightMiddle => !((toward_left || toward_right) && !has_right_lane),
        ShiftKind::None => true,
    }
}

/// True if the footprint at any sample in `[start_idx, end_idx)` touches a
/// boundary line of any of `lanes`.
pub fn straddles_road_bound(
    path: &PathWithLaneId,
    shift_line: &ShiftLine,
    lanes: &[&Lanelet],
    vehicle: &VehicleShape,
) -> bool {
    let end = shift_line.end_idx.min(path.len());
    if shift_line.start_idx >= end {
        return false;
    }

    for lane in lanes {
        for pt in &path.points[shift_line.start_idx..end] {
            let footprint = vehicle.footprint_at(&pt.pose);
            if polyline_intersects_polygon(&lane.left_bound, &footprint) {
                return true;
            }
            if polyline_intersects_polygon(&lane.right_bound, &footprint) {
                return true;
            }
        }
    }
    false
}

/// True only for a return shift with ego already back inside one of the
/// original lanes.
pub fn is_near_end_of_return(kind: ShiftKind, ego: DVec2, original_lanes: &[&Lanelet]) -> bool {
    if kind != ShiftKind::Return {
        return false;
    }
    original_lanes.iter().any(|lane| lane.contains(ego))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Pose;
    use crate::path::PathPoint;

    const EPS: f64 = 0.3;

    #[test]
    fn classification_is_exclusive() {
        assert_eq!(classify_shift(0.0, 1.0, EPS), ShiftKind::Avoid);
        assert_eq!(classify_shift(0.0, -1.0, EPS), ShiftKind::Avoid);
        assert_eq!(classify_shift(1.0, 0.1, EPS), ShiftKind::Return);
        assert_eq!(classify_shift(-1.0, 0.0, EPS), ShiftKind::Return);
        assert_eq!(classify_shift(0.5, 1.5, EPS), ShiftKind::LeftMiddle);
        assert_eq!(classify_shift(-0.5, -1.5, EPS), ShiftKind::RightMiddle);
        assert_eq!(classify_shift(0.1, -0.2, EPS), ShiftKind::None);
        // crossing from one side to the other fits none of the four
        assert_eq!(classify_shift(1.0, -1.0, EPS), ShiftKind::None);
        // exactly on the threshold is not "above" it
        assert_eq!(classify_shift(0.0, EPS, EPS), ShiftKind::None);
    }

    #[test]
    fn side_lane_rule_table() {
        // avoid
        assert!(!side_lane_exists(ShiftKind::Avoid, 1.0, false, true));
        assert!(side_lane_exists(ShiftKind::Avoid, 1.0, true, false));
        assert!(!side_lane_exists(ShiftKind::Avoid, -1.0, true, false));
        // return
        assert!(!side_lane_exists(ShiftKind::Return, 1.0, true, false));
        assert!(side_lane_exists(ShiftKind::Return, 1.0, false, true));
        assert!(!side_lane_exists(ShiftKind::Return, -1.0, false, true));
        // middles veto either direction against their own side
        assert!(!side_lane_exists(ShiftKind::LeftMiddle, 0.5, false, true));
        assert!(!side_lane_exists(ShiftKind::LeftMiddle, -0.5, false, true));
        assert!(side_lane_exists(ShiftKind::LeftMiddle, -0.5, true, false));
        assert!(!side_lane_exists(ShiftKind::RightMiddle, 0.5, true, false));
        assert!(!side_lane_exists(ShiftKind::RightMiddle, -0.5, true, false));
        assert!(side_lane_exists(ShiftKind::RightMiddle, 0.5, false, true));
        assert!(side_lane_exists(ShiftKind::None, 1.0, false, false));
    }

    fn lane_band() -> Lanelet {
        Lanelet::from_bounds(
            7,
            vec![DVec2::new(-10.0, 1.75), DVec2::new(60.0, 1.75)],
            vec![DVec2::new(-10.0, -1.75), DVec2::new(60.0, -1.75)],
        )
    }

    fn offset_path(offset: f64) -> PathWithLaneId {
        PathWithLaneId::new(
            (0..30)
                .map(|i| PathPoint::new(Pose::new(i as f64, offset, 0.0), vec![7]))
                .collect(),
        )
    }

    #[test]
    fn footprint_inside_lane_does_not_straddle() {
        let lane = lane_band();
        let vehicle = VehicleShape::default();
        let shift = ShiftLine {
            start_idx: 5,
            end_idx: 15,
            start_shift_length: 0.0,
            end_shift_length: 0.5,
        };
        assert!(!straddles_road_bound(&offset_path(0.5), &shift, &[&lane], &vehicle));
        assert!(straddles_road_bound(&offset_path(1.5), &shift, &[&lane], &vehicle));
    }

    #[test]
    fn near_end_only_for_return() {
        let lane = lane_band();
        let inside = DVec2::new(5.0, 0.0);
        assert!(is_near_end_of_return(ShiftKind::Return, inside, &[&lane]));
        assert!(!is_near_end_of_return(ShiftKind::Avoid, inside, &[&lane]));
        assert!(!is_near_end_of_return(ShiftKind::Return, DVec2::new(5.0, 9.0), &[&lane]));
    }
}
