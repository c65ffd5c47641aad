//! Uniform Catmull-Rom segment evaluation. The segment runs from `p1` (t = 0)
//! to `p2` (t = 1); `p0` and `p3` only shape the tangents.

use nalgebra::{UnitQuaternion, Vector3};
use super::{Point, Vec3};

pub fn position(p0: &Point, p1: &Point, p2: &Point, p3: &Point, t: f32) -> Point {
    let t2 = t * t;
    let t3 = t2 * t;
    let (a, b, c, d) = (p0.coords, p1.coords, p2.coords, p3.coords);

    let v = (b * 2.0
        + (c - a) * t
        + (a * 2.0 - b * 5.0 + c * 4.0 - d) * t2
        + (-a + b * 3.0 - c * 3.0 + d) * t3)
        * 0.5;
    Point::from(v)
}

/// First derivative with respect to `t`.
pub fn tangent(p0: &Point, p1: &Point, p2: &Point, p3: &Point, t: f32) -> Vec3 {
    let t2 = t * t;
    let (a, b, c, d) = (p0.coords, p1.coords, p2.coords, p3.coords);

    ((c - a)
        + (a * 2.0 - b * 5.0 + c * 4.0 - d) * (2.0 * t)
        + (-a + b * 3.0 - c * 3.0 + d) * (3.0 * t2))
        * 0.5
}

/// Second derivative with respect to `t`.
pub fn concavity(p0: &Point, p1: &Point, p2: &Point, p3: &Point, t: f32) -> Vec3 {
    let (a, b, c, d) = (p0.coords, p1.coords, p2.coords, p3.coords);

    ((a * 2.0 - b * 5.0 + c * 4.0 - d) * 2.0 + (-a + b * 3.0 - c * 3.0 + d) * (6.0 * t)) * 0.5
}

/// Look rotation along the tangent with world up. Local +X is the lane "right".
pub fn orientation(p0: &Point, p1: &Point, p2: &Point, p3: &Point, t: f32) -> UnitQuaternion<f32> {
    look_rotation(&tangent(p0, p1, p2, p3, t))
}

pub fn look_rotation(forward: &Vec3) -> UnitQuaternion<f32> {
    let up = Vector3::y();
    if forward.norm_squared() < 1e-12 {
        return UnitQuaternion::identity();
    }
    // face_towards is singular when forward is parallel to up
    if forward.normalize().cross(&up).norm_squared() < 1e-12 {
        return UnitQuaternion::face_towards(forward, &Vector3::z());
    }
    UnitQuaternion::face_towards(forward, &up)
}

/// Polyline approximation of the segment length.
pub fn arc_length(p0: &Point, p1: &Point, p2: &Point, p3: &Point, samples: usize) -> f32 {
    let samples = samples.max(1);
    let mut length = 0.0;
    let mut previous = position(p0, p1, p2, p3, 0.0);

    for i in 1..=samples {
        let t = i as f32 / samples as f32;
        let current = position(p0, p1, p2, p3, t);
        length += (current - previous).norm();
        previous = current;
    }

    length
}
