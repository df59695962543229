//! Planned path with per-point lane references, plus the arc-length helpers
//! the decider measures every distance with.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::geometry::{azimuth, normalize_radian, Pose};
use crate::lanelet::LaneletId;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub pose: Pose,
    /// Lane segments this point belongs to (usually one, two on a boundary).
    pub lane_ids: Vec<LaneletId>,
}

impl PathPoint {
    pub fn new(pose: Pose, lane_ids: Vec<LaneletId>) -> Self {
        Self { pose, lane_ids }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathWithLaneId {
    pub points: Vec<PathPoint>,
}

impl PathWithLaneId {
    pub fn new(points: Vec<PathPoint>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn position(&self, idx: usize) -> DVec2 {
        self.points[idx].pose.position
    }

    /// Index of the point closest to `p`.
    pub fn find_nearest_index(&self, p: DVec2) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, pt)| (i, pt.pose.position.distance_squared(p)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }

    /// Segment `i` spans points `i..=i+1`. Picks the segment around the
    /// nearest point that `p` projects forward onto.
    pub fn find_nearest_segment_index(&self, p: DVec2) -> Option<usize> {
        let nearest = self.find_nearest_index(p)?;
        Some(self.segment_index_around(nearest, p))
    }

    /// Nearest segment, preferring points within `dist_threshold` and whose
    /// heading differs from `pose` by at most `yaw_threshold`. Falls back to
    /// the unconstrained nearest segment when nothing qualifies.
    pub fn find_nearest_segment_index_with_soft_constraints(
        &self,
        pose: &Pose,
        dist_threshold: f64,
        yaw_threshold: f64,
    ) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }

        let dist_sq_th = dist_threshold * dist_threshold;
        let constrained = self
            .points
            .iter()
            .enumerate()
            .filter(|(_, pt)| {
                let d2 = pt.pose.position.distance_squared(pose.position);
                let dyaw = normalize_radian(pt.pose.yaw - pose.yaw).abs();
                d2 <= dist_sq_th && dyaw <= yaw_threshold
            })
            .map(|(i, pt)| (i, pt.pose.position.distance_squared(pose.position)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i);

        match constrained {
            Some(i) => Some(self.segment_index_around(i, pose.position)),
            None => self.find_nearest_segment_index(pose.position),
        }
    }

    fn segment_index_around(&self, nearest: usize, p: DVec2) -> usize {
        if self.points.len() < 2 || nearest == 0 {
            return 0;
        }
        let last = self.points.len() - 1;
        if nearest == last {
            return last - 1;
        }
        if self.longitudinal_offset_to_segment(nearest, p) <= 0.0 {
            nearest - 1
        } else {
            nearest
        }
    }

    /// Signed projection of `p` onto segment `seg_idx`, measured from the
    /// segment start.
    pub fn longitudinal_offset_to_segment(&self, seg_idx: usize, p: DVec2) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let seg_idx = seg_idx.min(self.points.len() - 2);
        let a = self.position(seg_idx);
        let b = self.position(seg_idx + 1);
        let ab = b - a;
        let len = ab.length();
        if len <= f64::EPSILON {
            return 0.0;
        }
        (p - a).dot(ab) / len
    }

    /// Arc length from the first point to point `idx`.
    pub fn arc_length_to(&self, idx: usize) -> f64 {
        let end = idx.min(self.points.len().saturating_sub(1));
        (0..end)
            .map(|i| self.position(i).distance(self.position(i + 1)))
            .sum()
    }

    pub fn total_length(&self) -> f64 {
        self.arc_length_to(self.points.len().saturating_sub(1))
    }

    /// Signed arc length from `src` (on segment `src_seg`) to `dst` (on
    /// segment `dst_seg`). Negative when `dst` lies behind `src`.
    pub fn signed_arc_length(&self, src: DVec2, src_seg: usize, dst: DVec2, dst_seg: usize) -> f64 {
        let on_path = self.arc_length_to(dst_seg) - self.arc_length_to(src_seg);
        on_path - self.longitudinal_offset_to_segment(src_seg, src)
            + self.longitudinal_offset_to_segment(dst_seg, dst)
    }

    /// Signed arc length from `src` (on segment `src_seg`) to point `dst_idx`.
    pub fn signed_arc_length_to_index(&self, src: DVec2, src_seg: usize, dst_idx: usize) -> f64 {
        self.arc_length_to(dst_idx)
            - self.arc_length_to(src_seg)
            - self.longitudinal_offset_to_segment(src_seg, src)
    }

    /// Interpolated pose at arc length `s`, clamped to the path ends. Yaw is
    /// the heading of the segment `s` falls on.
    pub fn pose_at_arc_length(&self, s: f64) -> Option<Pose> {
        let first = self.points.first()?;
        if self.points.len() < 2 || s <= 0.0 {
            return Some(first.pose);
        }

        let mut acc = 0.0;
        for i in 0..self.points.len() - 1 {
            let a = self.position(i);
            let b = self.position(i + 1);
            let seg_len = a.distance(b);
            if acc + seg_len >= s && seg_len > f64::EPSILON {
                let t = (s - acc) / seg_len;
                return Some(Pose {
                    position: a.lerp(b, t),
                    yaw: azimuth(a, b),
                });
            }
            acc += seg_len;
        }
        self.points.last().map(|p| p.pose)
    }

    /// Distinct lane ids referenced from point `from` onward, in path order.
    pub fn lane_ids_from(&self, from: usize) -> Vec<LaneletId> {
        let mut out: Vec<LaneletId> = Vec::new();
        for pt in self.points.iter().skip(from) {
            for id in &pt.lane_ids {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(n: usize) -> PathWithLaneId {
        PathWithLaneId::new(
            (0..n)
                .map(|i| PathPoint::new(Pose::new(i as f64, 0.0, 0.0), vec![1]))
                .collect(),
        )
    }

    #[test]
    fn segment_index_tracks_projection() {
        let path = straight(10);
        assert_eq!(path.find_nearest_segment_index(DVec2::new(3.4, 0.2)), Some(3));
        assert_eq!(path.find_nearest_segment_index(DVec2::new(3.6, 0.2)), Some(3));
        assert_eq!(path.find_nearest_segment_index(DVec2::new(-2.0, 0.0)), Some(0));
        assert_eq!(path.find_nearest_segment_index(DVec2::new(20.0, 0.0)), Some(8));
    }

    #[test]
    fn signed_arc_length_is_antisymmetric() {
        let path = straight(10);
        let a = DVec2::new(2.5, 0.0);
        let b = DVec2::new(7.25, 0.0);
        let fwd = path.signed_arc_length(a, 2, b, 7);
        let back = path.signed_arc_length(b, 7, a, 2);
        assert!((fwd - 4.75).abs() < 1e-9);
        assert!((fwd + back).abs() < 1e-9);
    }

    #[test]
    fn soft_constraints_skip_opposite_heading() {
        // A path that doubles back: the nearest point by distance faces the
        // other way, so the yaw constraint must pick the forward leg.
        let mut pts: Vec<PathPoint> = (0..5)
            .map(|i| PathPoint::new(Pose::new(i as f64, 0.0, 0.0), vec![]))
            .collect();
        pts.extend((0..5).map(|i| {
            PathPoint::new(Pose::new(4.0 - i as f64, 0.5, std::f64::consts::PI), vec![])
        }));
        let path = PathWithLaneId::new(pts);
        let ego = Pose::new(1.2, 0.4, 0.0);
        let seg = path
            .find_nearest_segment_index_with_soft_constraints(&ego, 3.0, 1.0)
            .unwrap();
        assert_eq!(seg, 1);
    }

    #[test]
    fn pose_interpolates_and_clamps() {
        let path = straight(5);
        let p = path.pose_at_arc_length(2.5).unwrap();
        assert!((p.position.x - 2.5).abs() < 1e-9);
        let end = path.pose_at_arc_length(100.0).unwrap();
        assert!((end.position.x - 4.0).abs() < 1e-9);
        let start = path.pose_at_arc_length(-3.0).unwrap();
        assert!(start.position.x.abs() < 1e-9);
    }
}
