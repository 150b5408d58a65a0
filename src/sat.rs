//! Separating Axis Theorem on the ground plane.
//!
//! All tests are posed as "vehicle box against obstacle" and, on contact,
//! return the minimum translation that moves the vehicle out: a unit normal
//! pointing away from the obstacle and a penetration depth.

use glam::Vec2;

use crate::geometry::Aabb;

/// Oriented box on the ground plane. `Vec2::y` is world Z.
///
/// `rotation` follows the vehicle heading convention: at `0` the local X axis is
/// world `+X` and the local Z axis is world `+Z`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obb {
    pub center: Vec2,
    /// Half extent along local X (width) and local Z (length).
    pub half_extents: Vec2,
    pub rotation: f32,
}

impl Obb {
    pub fn new(center: Vec2, half_extents: Vec2, rotation: f32) -> Self {
        Self {
            center,
            half_extents,
            rotation,
        }
    }

    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self::new(aabb.center(), aabb.half_extents(), 0.0)
    }

    /// Local X and local Z axes in world space.
    pub fn axes(&self) -> [Vec2; 2] {
        let (sin, cos) = self.rotation.sin_cos();
        [Vec2::new(cos, -sin), Vec2::new(sin, cos)]
    }

    /// Half-length of this box's shadow on a unit `axis`.
    pub fn radius_on(&self, axis: Vec2) -> f32 {
        let [lx, lz] = self.axes();
        self.half_extents.x * axis.dot(lx).abs() + self.half_extents.y * axis.dot(lz).abs()
    }

    pub fn bounding_radius(&self) -> f32 {
        self.half_extents.length()
    }

    pub fn to_local(&self, p: Vec2) -> Vec2 {
        let [lx, lz] = self.axes();
        let d = p - self.center;
        Vec2::new(d.dot(lx), d.dot(lz))
    }

    pub fn dir_to_world(&self, v: Vec2) -> Vec2 {
        let [lx, lz] = self.axes();
        lx * v.x + lz * v.y
    }
}

/// Minimum translation out of an obstacle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Penetration {
    /// Unit vector pointing away from the obstacle.
    pub normal: Vec2,
    pub depth: f32,
}

impl Penetration {
    /// Translation that clears the obstacle with `margin` to spare.
    pub fn pushback(&self, margin: f32) -> Vec2 {
        self.normal * (self.depth + margin)
    }
}

/// Overlap of `vehicle` and `obstacle` projected on each axis.
///
/// Any axis with zero or negative overlap separates the boxes. Zero-length
/// axes are skipped, so a degenerate axis can never produce a NaN normal.
fn separate(vehicle: &Obb, obstacle: &Obb, axes: &[Vec2]) -> Option<Penetration> {
    let offset = vehicle.center - obstacle.center;
    let mut best: Option<Penetration> = None;

    for &raw in axes {
        let len = raw.length();
        if !(len > 1e-6) {
            continue;
        }
        let axis = raw / len;
        let dist = offset.dot(axis);
        let overlap = vehicle.radius_on(axis) + obstacle.radius_on(axis) - dist.abs();
        if overlap <= 0.0 {
            return None;
        }
        if best.map_or(true, |b| overlap < b.depth) {
            let normal = if dist >= 0.0 { axis } else { -axis };
            best = Some(Penetration {
                normal,
                depth: overlap,
            });
        }
    }
    best
}

/// Building footprint against the vehicle box: world X, world Z and the two
/// vehicle axes.
pub fn aabb_vs_obb(aabb: &Aabb, vehicle: &Obb) -> Option<Penetration> {
    let [vx, vz] = vehicle.axes();
    separate(vehicle, &Obb::from_aabb(aabb), &[Vec2::X, Vec2::Y, vx, vz])
}

/// Two oriented boxes: both boxes' local axes.
pub fn obb_vs_obb(obstacle: &Obb, vehicle: &Obb) -> Option<Penetration> {
    let [ox, oz] = obstacle.axes();
    let [vx, vz] = vehicle.axes();
    separate(vehicle, obstacle, &[ox, oz, vx, vz])
}

/// Circle against the vehicle box via the closest point in box-local space.
pub fn circle_vs_obb(center: Vec2, radius: f32, vehicle: &Obb) -> Option<Penetration> {
    let local = vehicle.to_local(center);
    let he = vehicle.half_extents;
    let closest = local.clamp(-he, he);
    let diff = local - closest;
    let dist_sq = diff.length_squared();
    if dist_sq >= radius * radius {
        return None;
    }

    let (normal_local, depth) = if dist_sq > 1e-12 {
        let dist = dist_sq.sqrt();
        // Box moves from the circle centre toward its own closest point.
        (-diff / dist, radius - dist)
    } else {
        // Circle centre inside the box: leave through the nearest face.
        let gap_x = he.x - local.x.abs();
        let gap_z = he.y - local.y.abs();
        if gap_x <= gap_z {
            let sign = if local.x >= 0.0 { -1.0 } else { 1.0 };
            (Vec2::new(sign, 0.0), gap_x + radius)
        } else {
            let sign = if local.y >= 0.0 { -1.0 } else { 1.0 };
            (Vec2::new(0.0, sign), gap_z + radius)
        }
    };

    Some(Penetration {
        normal: vehicle.dir_to_world(normal_local),
        depth,
    })
}
