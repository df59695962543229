//! Planar geometry used by the turn-signal predicates.
//!
//! Everything here works in a 2D map frame. Heights are ignored: lane
//! boundaries and vehicle footprints are compared in projection.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Position and heading in the map frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: DVec2,
    /// Heading in radians, counter-clockwise from +x.
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            position: DVec2::new(x, y),
            yaw,
        }
    }

    /// Unit vector along the heading.
    #[inline]
    pub fn heading(&self) -> DVec2 {
        DVec2::from_angle(self.yaw)
    }

    /// Map a point expressed in this pose's local frame into the map frame.
    #[inline]
    pub fn transform(&self, local: DVec2) -> DVec2 {
        self.position + self.heading().rotate(local)
    }
}

/// Wrap an angle into (-pi, pi].
pub fn normalize_radian(angle: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut a = angle % two_pi;
    if a > std::f64::consts::PI {
        a -= two_pi;
    } else if a <= -std::f64::consts::PI {
        a += two_pi;
    }
    a
}

/// Heading of the segment `a -> b`.
#[inline]
pub fn azimuth(a: DVec2, b: DVec2) -> f64 {
    let d = b - a;
    d.y.atan2(d.x)
}

/// Ray-casting point-in-polygon test. Points exactly on an edge may land on
/// either side.
pub fn point_in_polygon(p: DVec2, verts: &[DVec2]) -> bool {
    if verts.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let vi = verts[i];
        let vj = verts[j];
        let crosses = (vi.y > p.y) != (vj.y > p.y)
            && p.x < (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x;
        if crosses {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn orientation(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b - a).perp_dot(c - a)
}

fn on_segment(a: DVec2, b: DVec2, p: DVec2) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Closed-segment intersection, collinear overlaps included.
pub fn segments_intersect(a1: DVec2, a2: DVec2, b1: DVec2, b2: DVec2) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}

/// True when a polyline touches a closed polygon: an edge crossing, or a
/// polyline vertex lying inside.
pub fn polyline_intersects_polygon(line: &[DVec2], polygon: &[DVec2]) -> bool {
    if line.is_empty() || polygon.len() < 3 {
        return false;
    }

    if line.iter().any(|p| point_in_polygon(*p, polygon)) {
        return true;
    }

    for seg in line.windows(2) {
        for k in 0..polygon.len() {
            let e1 = polygon[k];
            let e2 = polygon[(k + 1) % polygon.len()];
            if segments_intersect(seg[0], seg[1], e1, e2) {
                return true;
            }
        }
    }
    false
}

/// Total length of a polyline.
pub fn polyline_length(points: &[DVec2]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Point at arc length `s` along a polyline, clamped to its ends.
pub fn interpolate_polyline(points: &[DVec2], s: f64) -> Option<DVec2> {
    let first = *points.first()?;
    if s <= 0.0 {
        return Some(first);
    }

    let mut acc = 0.0;
    for w in points.windows(2) {
        let seg_len = w[0].distance(w[1]);
        if acc + seg_len >= s && seg_len > f64::EPSILON {
            return Some(w[0].lerp(w[1], (s - acc) / seg_len));
        }
        acc += seg_len;
    }
    points.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<DVec2> {
        vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(2.0, 0.0),
            DVec2::new(2.0, 2.0),
            DVec2::new(0.0, 2.0),
        ]
    }

    #[test]
    fn point_inside_and_outside() {
        assert!(point_in_polygon(DVec2::new(1.0, 1.0), &square()));
        assert!(!point_in_polygon(DVec2::new(3.0, 1.0), &square()));
    }

    #[test]
    fn crossing_and_disjoint_segments() {
        let a1 = DVec2::new(0.0, 0.0);
        let a2 = DVec2::new(2.0, 2.0);
        assert!(segments_intersect(a1, a2, DVec2::new(0.0, 2.0), DVec2::new(2.0, 0.0)));
        assert!(!segments_intersect(a1, a2, DVec2::new(3.0, 0.0), DVec2::new(4.0, 0.0)));
    }

    #[test]
    fn polyline_through_square() {
        let line = vec![DVec2::new(-1.0, 1.0), DVec2::new(3.0, 1.0)];
        assert!(polyline_intersects_polygon(&line, &square()));
        let far = vec![DVec2::new(-1.0, 5.0), DVec2::new(3.0, 5.0)];
        assert!(!polyline_intersects_polygon(&far, &square()));
    }

    #[test]
    fn radian_wraps_into_half_open_range() {
        assert!((normalize_radian(3.0 * std::f64::consts::PI) - std::f64::consts::PI).abs() < 1e-9);
        assert!((normalize_radian(-0.5) + 0.5).abs() < 1e-12);
    }
}
