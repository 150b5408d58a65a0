use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Ground-plane axis-aligned box covering `[min_x, max_x] × [min_z, max_z]`.
///
/// Buildings carry one of these as their footprint; it is the occluder used by
/// line-of-sight checks and the hard obstacle used by collision.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aabb {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Aabb {
    pub fn new(min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> Self {
        Self {
            min_x,
            max_x,
            min_z,
            max_z,
        }
    }

    /// Box centred on `center` with the given half extents.
    pub fn from_center(center: Vec2, half_x: f32, half_z: f32) -> Self {
        Self::new(
            center.x - half_x,
            center.x + half_x,
            center.y - half_z,
            center.y + half_z,
        )
    }

    /// Centre in ground-plane coordinates (`Vec2::y` holds world Z).
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min_x + self.max_x) * 0.5,
            (self.min_z + self.max_z) * 0.5,
        )
    }

    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(
            (self.max_x - self.min_x) * 0.5,
            (self.max_z - self.min_z) * 0.5,
        )
    }

    /// True when the corners are finite and `min <= max` on both axes.
    pub fn is_well_formed(&self) -> bool {
        [self.min_x, self.max_x, self.min_z, self.max_z]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_z <= self.max_z
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_z && p.y <= self.max_z
    }

    /// Slab-method segment test on the ground plane.
    ///
    /// Returns the entry parameter `t ∈ [0, 1]` along `from → to`, or `None`
    /// when the segment misses the box.
    pub fn segment_entry(&self, from: Vec2, to: Vec2) -> Option<f32> {
        let dir = to - from;
        let mut t_near = 0.0_f32;
        let mut t_far = 1.0_f32;

        for (origin, d, lo, hi) in [
            (from.x, dir.x, self.min_x, self.max_x),
            (from.y, dir.y, self.min_z, self.max_z),
        ] {
            if d.abs() < 1e-9 {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t1 = (lo - origin) * inv;
            let mut t2 = (hi - origin) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_near = t_near.max(t1);
            t_far = t_far.min(t2);
            if t_near > t_far {
                return None;
            }
        }
        Some(t_near)
    }
}

/// Wrap an angle into `[-π, π]`.
pub fn normalize_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid can land exactly on TAU through rounding.
    wrapped.clamp(-PI, PI)
}

/// Signed bearing of `target` as seen from `origin` facing `heading`.
///
/// `0` is straight ahead, positive is to the right.
pub fn bearing(origin: Vec3, heading: f32, target: Vec3) -> f32 {
    let dx = target.x - origin.x;
    let dz = target.z - origin.z;
    normalize_angle(dx.atan2(dz) - heading)
}

/// Ground-plane distance between two world points.
pub fn ground_distance(a: Vec3, b: Vec3) -> f32 {
    Vec2::new(b.x - a.x, b.z - a.z).length()
}

/// True when the straight ground-plane path `from → to` crosses none of the
/// occluders.
///
/// An occluder that contains either endpoint does not block: a target standing
/// inside a footprint (a doorway, a parked car against a wall) is still seen.
pub fn line_of_sight(from: Vec2, to: Vec2, occluders: &[Aabb]) -> bool {
    const EPS: f32 = 1e-4;
    !occluders.iter().any(|aabb| {
        if aabb.contains(from) || aabb.contains(to) {
            return false;
        }
        matches!(aabb.segment_entry(from, to), Some(t) if t > EPS && t < 1.0 - EPS)
    })
}
