use glam::Vec3;

use crate::target::Target;

/// Nearest surface hit along a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneHit {
    /// Distance along the (unit) ray direction, metres.
    pub distance: f32,
    /// World-space hit point.
    pub point: Vec3,
}

/// Ray query against renderable geometry, supplied by the host.
///
/// `direction` is unit length. Returns the nearest hit in front of `origin`.
pub trait SceneIntersect {
    fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<SceneHit>;
}

impl<F> SceneIntersect for F
where
    F: Fn(Vec3, Vec3) -> Option<SceneHit>,
{
    fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<SceneHit> {
        self(origin, direction)
    }
}

/// Solid axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolidBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl SolidBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Slab-method ray/box test. Returns the entry distance, or the exit
    /// distance when the origin is inside.
    pub fn ray_intersect(&self, origin: Vec3, inv_dir: Vec3) -> Option<f32> {
        let t1 = (self.min - origin) * inv_dir;
        let t2 = (self.max - origin) * inv_dir;
        let t_min_v = t1.min(t2);
        let t_max_v = t1.max(t2);
        let t_near = t_min_v.x.max(t_min_v.y).max(t_min_v.z);
        let t_far = t_max_v.x.min(t_max_v.y).min(t_max_v.z);
        if t_near <= t_far && t_far >= 0.0 {
            Some(if t_near >= 0.0 { t_near } else { t_far })
        } else {
            None
        }
    }

    /// Whether the ray enters this box no later than `t_max`.
    fn crossed_before(&self, origin: Vec3, inv_dir: Vec3, t_max: f32) -> bool {
        let t1 = (self.min - origin) * inv_dir;
        let t2 = (self.max - origin) * inv_dir;
        let t_near = t1.min(t2).max_element();
        let t_far = t1.max(t2).min_element();
        t_near <= t_far && t_far >= 0.0 && t_near <= t_max
    }

    fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    fn merge(&self, other: &SolidBox) -> SolidBox {
        SolidBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Reference scene made of target boxes over an optional ground plane.
///
/// Stands in for the renderer's raycaster in tests and in hosts that have no
/// mesh geometry of their own. The boxes sit in a bounding volume hierarchy,
/// so a ray only visits the boxes whose enclosing nodes it crosses.
#[derive(Clone, Debug, Default)]
pub struct BoxScene {
    boxes: Vec<SolidBox>,
    root: Option<BoxNode>,
    ground_y: Option<f32>,
}

#[derive(Clone, Debug)]
enum BoxNode {
    Leaf {
        bounds: SolidBox,
        members: Vec<usize>,
    },
    Interior {
        bounds: SolidBox,
        left: Box<BoxNode>,
        right: Box<BoxNode>,
    },
}

const MAX_LEAF_BOXES: usize = 4;

impl BoxNode {
    fn bounds(&self) -> &SolidBox {
        match self {
            BoxNode::Leaf { bounds, .. } => bounds,
            BoxNode::Interior { bounds, .. } => bounds,
        }
    }

    fn build(boxes: &[SolidBox], members: &mut [usize]) -> BoxNode {
        let bounds = members
            .iter()
            .map(|&i| boxes[i])
            .reduce(|a, b| a.merge(&b))
            .unwrap_or_else(SolidBox::empty);

        if members.len() <= MAX_LEAF_BOXES {
            return BoxNode::Leaf {
                bounds,
                members: members.to_vec(),
            };
        }

        // Split along the longest axis at the median centroid.
        let extent = bounds.max - bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        members.sort_unstable_by(|&a, &b| {
            let ca = boxes[a].centroid()[axis];
            let cb = boxes[b].centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mid = members.len() / 2;
        let (left, right) = members.split_at_mut(mid);
        BoxNode::Interior {
            bounds,
            left: Box::new(Self::build(boxes, left)),
            right: Box::new(Self::build(boxes, right)),
        }
    }

    /// Closest hit below `t_max` in this subtree.
    fn intersect(
        &self,
        boxes: &[SolidBox],
        origin: Vec3,
        inv_dir: Vec3,
        t_max: f32,
    ) -> Option<f32> {
        if !self.bounds().crossed_before(origin, inv_dir, t_max) {
            return None;
        }
        match self {
            BoxNode::Leaf { members, .. } => {
                let mut closest = None::<f32>;
                for &i in members {
                    if let Some(t) = boxes[i].ray_intersect(origin, inv_dir) {
                        if t <= closest.unwrap_or(t_max) {
                            closest = Some(t);
                        }
                    }
                }
                closest
            }
            BoxNode::Interior { left, right, .. } => {
                let t_left = left.intersect(boxes, origin, inv_dir, t_max);
                let t_right = right.intersect(boxes, origin, inv_dir, t_left.unwrap_or(t_max));
                match (t_left, t_right) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            }
        }
    }
}

impl BoxScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boxes(boxes: Vec<SolidBox>) -> Self {
        let mut members: Vec<usize> = (0..boxes.len()).collect();
        let root = if boxes.is_empty() {
            None
        } else {
            Some(BoxNode::build(&boxes, &mut members))
        };
        Self {
            boxes,
            root,
            ground_y: None,
        }
    }

    /// Boxes for every visible target: building footprints extruded to their
    /// height, everything else from its bounds.
    pub fn from_targets<'a>(targets: impl IntoIterator<Item = &'a Target>) -> Self {
        let boxes = targets
            .into_iter()
            .filter(|t| t.visible)
            .map(|t| {
                let fp = t.footprint();
                let base = t.position.y;
                SolidBox::new(
                    Vec3::new(fp.min_x, base, fp.min_z),
                    Vec3::new(fp.max_x, base + t.bounds.height, fp.max_z),
                )
            })
            .collect();
        Self::from_boxes(boxes)
    }

    pub fn with_ground(mut self, y: f32) -> Self {
        self.ground_y = Some(y);
        self
    }

    /// Add one box and rebuild the hierarchy.
    pub fn push(&mut self, solid: SolidBox) {
        let mut boxes = std::mem::take(&mut self.boxes);
        boxes.push(solid);
        *self = Self {
            ground_y: self.ground_y,
            ..Self::from_boxes(boxes)
        };
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.ground_y.is_none()
    }
}

impl SceneIntersect for BoxScene {
    fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<SceneHit> {
        // IEEE division yields ±inf for zero components, which the slab test handles.
        let inv_dir = Vec3::ONE / direction;
        let mut closest = self
            .root
            .as_ref()
            .and_then(|root| root.intersect(&self.boxes, origin, inv_dir, f32::INFINITY));

        if let Some(ground) = self.ground_y {
            if direction.y < -1e-6 {
                let t = (ground - origin.y) / direction.y;
                if t >= 0.0 && closest.map_or(true, |c| t < c) {
                    closest = Some(t);
                }
            }
        }

        closest.map(|distance| SceneHit {
            distance,
            point: origin + direction * distance,
        })
    }
}

/// Two scenes queried as one: the nearer hit wins.
///
/// Lets a prebuilt static scene be combined with a small per-frame one
/// without rebuilding the static part.
pub struct Layered<'a, A: ?Sized, B: ?Sized> {
    pub base: &'a A,
    pub overlay: &'a B,
}

impl<A, B> SceneIntersect for Layered<'_, A, B>
where
    A: SceneIntersect + ?Sized,
    B: SceneIntersect + ?Sized,
{
    fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<SceneHit> {
        match (
            self.base.intersect(origin, direction),
            self.overlay.intersect(origin, direction),
        ) {
            (Some(a), Some(b)) => Some(if b.distance < a.distance { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Aabb;

    #[test]
    fn box_scene_hits_nearest_box() {
        let mut scene = BoxScene::new();
        scene.push(SolidBox::new(Vec3::new(-1.0, 0.0, 10.0), Vec3::new(1.0, 3.0, 12.0)));
        scene.push(SolidBox::new(Vec3::new(-1.0, 0.0, 5.0), Vec3::new(1.0, 3.0, 6.0)));
        let hit = scene
            .intersect(Vec3::new(0.0, 1.0, 0.0), Vec3::Z)
            .expect("ray along +Z hits");
        assert!((hit.distance - 5.0).abs() < 1e-5, "got {}", hit.distance);
        assert!((hit.point - Vec3::new(0.0, 1.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn box_scene_miss() {
        let mut scene = BoxScene::new();
        scene.push(SolidBox::new(Vec3::new(-1.0, 0.0, 5.0), Vec3::new(1.0, 3.0, 6.0)));
        assert!(scene.intersect(Vec3::new(0.0, 1.0, 0.0), -Vec3::Z).is_none());
        assert!(scene.intersect(Vec3::new(0.0, 5.0, 0.0), Vec3::Z).is_none());
    }

    #[test]
    fn ground_plane_hit() {
        let scene = BoxScene::new().with_ground(0.0);
        let dir = Vec3::new(0.0, -1.0, 1.0).normalize();
        let hit = scene.intersect(Vec3::new(0.0, 2.0, 0.0), dir).unwrap();
        assert!((hit.point.y).abs() < 1e-5);
        assert!((hit.distance - 2.0 * 2.0_f32.sqrt()).abs() < 1e-4);
        assert!(scene.intersect(Vec3::new(0.0, 2.0, 0.0), Vec3::Y).is_none());
    }

    #[test]
    fn from_targets_extrudes_buildings() {
        let b = Target::building(1, Aabb::new(4.0, 8.0, -2.0, 2.0), 12.0, 20.0);
        let scene = BoxScene::from_targets([&b]);
        assert_eq!(scene.len(), 1);
        let hit = scene.intersect(Vec3::new(0.0, 11.0, 0.0), Vec3::X).unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-5);
        assert!(scene.intersect(Vec3::new(0.0, 13.0, 0.0), Vec3::X).is_none());
    }

    #[test]
    fn hierarchy_agrees_with_brute_force() {
        let mut boxes = Vec::new();
        for i in 0..12 {
            for j in 0..12 {
                let x = -60.0 + 10.0 * i as f32;
                let z = -60.0 + 10.0 * j as f32;
                let h = 2.0 + ((i * 7 + j * 3) % 5) as f32 * 3.0;
                boxes.push(SolidBox::new(Vec3::new(x, 0.0, z), Vec3::new(x + 4.0, h, z + 4.0)));
            }
        }
        let scene = BoxScene::from_boxes(boxes.clone());
        assert_eq!(scene.len(), 144);

        let origin = Vec3::new(3.0, 4.0, -3.0);
        for k in 0..90 {
            let yaw = k as f32 * std::f32::consts::TAU / 90.0;
            let pitch = if k % 3 == 0 { -0.1 } else { 0.05 };
            let dir = Vec3::new(yaw.sin(), pitch, yaw.cos()).normalize();
            let inv = Vec3::ONE / dir;
            let expected = boxes
                .iter()
                .filter_map(|b| b.ray_intersect(origin, inv))
                .fold(None::<f32>, |acc, t| Some(acc.map_or(t, |a| a.min(t))));
            let got = scene.intersect(origin, dir).map(|h| h.distance);
            assert_eq!(got, expected, "ray {k}");
        }
    }

    #[test]
    fn push_keeps_ground_and_rebuilds() {
        let mut scene = BoxScene::new().with_ground(0.0);
        for z in 1..8 {
            let z = 10.0 * z as f32;
            scene.push(SolidBox::new(Vec3::new(-1.0, 0.0, z), Vec3::new(1.0, 3.0, z + 1.0)));
        }
        assert_eq!(scene.len(), 7);
        let hit = scene.intersect(Vec3::new(0.0, 1.0, 0.0), Vec3::Z).unwrap();
        assert!((hit.distance - 10.0).abs() < 1e-5);
        let down = scene.intersect(Vec3::new(0.0, 2.0, 0.0), -Vec3::Y).unwrap();
        assert!((down.distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn layered_scene_takes_the_nearer_hit() {
        let statics = BoxScene::from_boxes(vec![SolidBox::new(
            Vec3::new(-1.0, 0.0, 10.0),
            Vec3::new(1.0, 3.0, 11.0),
        )]);
        let actors = BoxScene::from_boxes(vec![SolidBox::new(
            Vec3::new(-1.0, 0.0, 4.0),
            Vec3::new(1.0, 3.0, 5.0),
        )]);
        let both = Layered {
            base: &statics,
            overlay: &actors,
        };
        let hit = both.intersect(Vec3::new(0.0, 1.0, 0.0), Vec3::Z).unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-5);
        let back = Layered {
            base: &actors,
            overlay: &statics,
        };
        assert_eq!(back.intersect(Vec3::new(0.0, 1.0, 0.0), Vec3::Z), Some(hit));
        let empty = BoxScene::new();
        let only_static = Layered {
            base: &statics,
            overlay: &empty,
        };
        let far = only_static.intersect(Vec3::new(0.0, 1.0, 0.0), Vec3::Z).unwrap();
        assert!((far.distance - 10.0).abs() < 1e-5);
    }

    #[test]
    fn closures_are_scenes() {
        let wall = |origin: Vec3, dir: Vec3| {
            Some(SceneHit {
                distance: 3.0,
                point: origin + dir * 3.0,
            })
        };
        let hit = wall.intersect(Vec3::ZERO, Vec3::X).unwrap();
        assert_eq!(hit.point, Vec3::new(3.0, 0.0, 0.0));
    }
}
