//! Geometric queries shared by player weapons and enemy attacks

use crate::util::vec2::Vec2;

/// Lengths below this count as zero, so an attacker never hits itself
pub const MIN_CONE_DISTANCE: f64 = 1e-4;

/// True iff `target` lies inside the cone anchored at `attacker`.
///
/// `aim` must be unit length. The attacker→target distance must be nonzero
/// and at most `length_px`, and its angle with `aim` at most `half_angle_rad`.
pub fn cone_contains(attacker: Vec2, aim: Vec2, target: Vec2, length_px: f64, half_angle_rad: f64) -> bool {
    let d = target - attacker;
    let len = d.length();
    if len <= MIN_CONE_DISTANCE || len > length_px {
        return false;
    }
    let dir = d * (1.0 / len);
    aim.dot(dir) >= half_angle_rad.cos()
}

/// Inclusive circle overlap test
#[inline]
pub fn circles_overlap(a: Vec2, ra: f64, b: Vec2, rb: f64) -> bool {
    let r = ra + rb;
    a.distance_sq_to(b) <= r * r
}

/// Unit vector from `from` to `to`, or `fallback` when the points coincide
pub fn direction_or(from: Vec2, to: Vec2, fallback: Vec2) -> Vec2 {
    let d = to - from;
    let len = d.length();
    if len == 0.0 {
        fallback
    } else {
        d * (1.0 / len)
    }
}
