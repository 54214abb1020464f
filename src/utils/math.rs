//! Additional math helpers layered on top of `glam`.

use glam::{Quat, Vec3};

/// Lengths below this are treated as degenerate directions.
pub const DIRECTION_EPSILON: f32 = 1e-6;

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < DIRECTION_EPSILON {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Any unit vector perpendicular to `n`.
pub fn any_perpendicular(n: Vec3) -> Vec3 {
    let helper = if n.x.abs() < 0.57 { Vec3::X } else { Vec3::Y };
    n.cross(helper).normalize_or_zero()
}

/// Closest point to `p` on segment `[a, b]`, with its parameter in `[0, 1]`.
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> (Vec3, f32) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < DIRECTION_EPSILON {
        return (a, 0.0);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t, t)
}

/// Closest points between segments `[p1, q1]` and `[p2, q2]`.
pub fn closest_points_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    if a < DIRECTION_EPSILON && e < DIRECTION_EPSILON {
        return (p1, p2);
    }
    let (s, t) = if a < DIRECTION_EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e < DIRECTION_EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > DIRECTION_EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}
