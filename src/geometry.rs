// src/geometry.rs - Small 2D helpers for limb and wrist constraints
use crate::pose::Point2D;

/// Floor for vector lengths before dividing by them.
pub const MIN_LENGTH: f64 = 1e-3;

/// Unit vector from `from` to `to`, or `None` when the points coincide.
pub fn unit(from: Point2D, to: Point2D) -> Option<Point2D> {
    let v = to - from;
    let len = v.norm();
    if len < MIN_LENGTH {
        None
    } else {
        Some(v * (1.0 / len))
    }
}

/// Moves `end` along the `anchor -> end` direction so the segment has length `length`.
/// A degenerate segment is returned unchanged.
pub fn place_at_length(anchor: Point2D, end: Point2D, length: f64) -> Point2D {
    match unit(anchor, end) {
        Some(u) => anchor + u * length,
        None => end,
    }
}

/// Cosine of the angle between two vectors, with lengths floored at [`MIN_LENGTH`].
pub fn cosine(a: Point2D, b: Point2D) -> f64 {
    a.dot(b) / (a.norm().max(MIN_LENGTH) * b.norm().max(MIN_LENGTH))
}

/// Median of the values; zero for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let m = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[m - 1] + sorted[m]) * 0.5
    } else {
        sorted[m]
    }
}

fn ccw(a: Point2D, b: Point2D, c: Point2D) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// True when segment `a-b` properly crosses segment `c-d`.
pub fn segments_intersect(a: Point2D, b: Point2D, c: Point2D, d: Point2D) -> bool {
    ccw(a, c, d) != ccw(b, c, d) && ccw(a, b, c) != ccw(a, b, d)
}

/// Wraps an undirected line angle into (-pi/2, pi/2].
pub fn wrap_orientation(angle: f64) -> f64 {
    use std::f64::consts::{FRAC_PI_2, PI};
    let mut a = angle % PI;
    if a <= -FRAC_PI_2 {
        a += PI;
    } else if a > FRAC_PI_2 {
        a -= PI;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn crossing_segments_detected() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(10.0, 10.0);
        let c = Point2D::new(0.0, 10.0);
        let d = Point2D::new(10.0, 0.0);
        assert!(segments_intersect(a, b, c, d));
        assert!(!segments_intersect(a, c, b, d));
    }

    #[test]
    fn place_at_length_keeps_direction() {
        let p = place_at_length(Point2D::new(0.0, 0.0), Point2D::new(3.0, 4.0), 10.0);
        assert_abs_diff_eq!(p.x, 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 8.0, epsilon = 1e-12);
    }

    #[test]
    fn orientation_wraps_to_half_turn() {
        use std::f64::consts::PI;
        assert_abs_diff_eq!(wrap_orientation(PI * 0.75), -PI * 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_orientation(-PI * 0.75), PI * 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_orientation(0.3), 0.3, epsilon = 1e-12);
    }
}
