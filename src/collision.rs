//! Contact detection and resolution between the player vehicle and the world.
//!
//! Static obstacles are turned into collision shapes once per world seed and
//! binned in the same block grid the sensors use. Every physics step the
//! vehicle box is tested against nearby shapes plus the visible actors:
//!
//! - hard contacts (buildings, pedestrians, vehicles) stop the car dead and
//!   push it out along the minimum translation vector;
//! - soft contacts (street furniture, animals, balls) shave a fraction off
//!   the speed, fractions adding up across simultaneous hits.
//!
//! Scoring is per object: each id moves armed → cooling down → armed, and only
//! contact while armed changes the score.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::environment::VehiclePose;
use crate::error::WorldError;
use crate::geometry::Aabb;
use crate::index::{BlockGrid, Footprint};
use crate::sat::{aabb_vs_obb, circle_vs_obb, obb_vs_obb, Obb, Penetration};
use crate::target::{ObjectId, Target, TargetClass};

/// Extra passes spent settling the car out of overlapping hard obstacles.
const MAX_SETTLE_PASSES: usize = 4;

/// Clearance added by settle pushes, metres.
const SETTLE_MARGIN: f32 = 1e-3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollisionConfig {
    pub vehicle_half_width: f32,
    pub vehicle_half_length: f32,
    /// Clearance added on top of the penetration depth when pushing out.
    pub pushback_margin: f32,
    /// Frames an object stays un-scoreable after a scored contact.
    pub cooldown_frames: u32,
    /// World is the square `[world_min, world_max]²` on X/Z.
    pub world_min: f32,
    pub world_max: f32,
    pub cell_stride: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            vehicle_half_width: 1.1,
            vehicle_half_length: 2.3,
            pushback_margin: 0.05,
            cooldown_frames: 60,
            world_min: -2000.0,
            world_max: 2000.0,
            cell_stride: 60.0,
        }
    }
}

impl CollisionConfig {
    pub fn validate(&self) -> Result<(), WorldError> {
        let positive = [
            ("vehicleHalfWidth", self.vehicle_half_width),
            ("vehicleHalfLength", self.vehicle_half_length),
            ("cellStride", self.cell_stride),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(WorldError::InvalidConfig(format!(
                    "collision {name} must be positive, got {value}"
                )));
            }
        }
        if !(self.pushback_margin.is_finite() && self.pushback_margin >= 0.0) {
            return Err(WorldError::InvalidConfig("collision pushbackMargin must be >= 0".into()));
        }
        if self.cooldown_frames == 0 {
            return Err(WorldError::InvalidConfig("collision cooldownFrames must be > 0".into()));
        }
        if !(self.world_min.is_finite()
            && self.world_max.is_finite()
            && self.world_min < self.world_max)
        {
            return Err(WorldError::InvalidConfig(format!(
                "world bounds [{}, {}] are empty",
                self.world_min, self.world_max
            )));
        }
        Ok(())
    }

    fn vehicle_half_extents(&self) -> Vec2 {
        Vec2::new(self.vehicle_half_width, self.vehicle_half_length)
    }
}

/// Whether a contact stops the car or only slows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Hard,
    Soft,
}

impl ContactKind {
    pub fn of(class: TargetClass) -> Self {
        match class {
            TargetClass::Building
            | TargetClass::Pedestrian
            | TargetClass::Vehicle
            | TargetClass::Emergency => ContactKind::Hard,
            TargetClass::Cone
            | TargetClass::Barrier
            | TargetClass::Pole
            | TargetClass::Sign
            | TargetClass::TrafficLight
            | TargetClass::Animal
            | TargetClass::Ball => ContactKind::Soft,
        }
    }
}

/// Score change for the first contact with an armed object.
pub fn score_delta(class: TargetClass) -> i32 {
    match class {
        TargetClass::Building => -50,
        TargetClass::Cone => -5,
        TargetClass::Barrier => -10,
        TargetClass::Pole => -15,
        TargetClass::Sign => -10,
        TargetClass::TrafficLight => -15,
        TargetClass::Pedestrian => -200,
        TargetClass::Vehicle => -75,
        TargetClass::Emergency => -150,
        TargetClass::Animal => -100,
        TargetClass::Ball => -20,
    }
}

/// Fraction of speed lost per soft contact. Hard classes stop the car outright.
pub fn slowdown_fraction(class: TargetClass) -> f32 {
    match class {
        TargetClass::Cone => 0.15,
        TargetClass::Barrier => 0.35,
        TargetClass::Pole => 0.5,
        TargetClass::Sign => 0.3,
        TargetClass::TrafficLight => 0.5,
        TargetClass::Animal => 0.6,
        TargetClass::Ball => 0.2,
        TargetClass::Building
        | TargetClass::Pedestrian
        | TargetClass::Vehicle
        | TargetClass::Emergency => 1.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CollisionShape {
    Building(Aabb),
    Circle { center: Vec2, radius: f32 },
    OrientedBox(Obb),
}

impl CollisionShape {
    pub fn for_target(target: &Target) -> Self {
        match target.class {
            TargetClass::Building => CollisionShape::Building(target.footprint()),
            TargetClass::Barrier => CollisionShape::OrientedBox(Obb::new(
                target.ground(),
                Vec2::new(target.bounds.half_width, target.bounds.half_depth),
                target.rotation,
            )),
            TargetClass::Cone
            | TargetClass::Pole
            | TargetClass::Sign
            | TargetClass::TrafficLight
            | TargetClass::Pedestrian
            | TargetClass::Vehicle
            | TargetClass::Emergency
            | TargetClass::Animal
            | TargetClass::Ball => CollisionShape::Circle {
                center: target.ground(),
                radius: target.bounds.half_width.max(target.bounds.half_depth),
            },
        }
    }

    pub fn center(&self) -> Vec2 {
        match self {
            CollisionShape::Building(aabb) => aabb.center(),
            CollisionShape::Circle { center, .. } => *center,
            CollisionShape::OrientedBox(obb) => obb.center,
        }
    }

    pub fn bounding_radius(&self) -> f32 {
        match self {
            CollisionShape::Building(aabb) => aabb.half_extents().length(),
            CollisionShape::Circle { radius, .. } => *radius,
            CollisionShape::OrientedBox(obb) => obb.bounding_radius(),
        }
    }

    /// Minimum translation pushing `vehicle` out of this shape.
    pub fn penetration(&self, vehicle: &Obb) -> Option<Penetration> {
        match self {
            CollisionShape::Building(aabb) => aabb_vs_obb(aabb, vehicle),
            CollisionShape::Circle { center, radius } => circle_vs_obb(*center, *radius, vehicle),
            CollisionShape::OrientedBox(obb) => obb_vs_obb(obb, vehicle),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionObject {
    pub id: ObjectId,
    pub class: TargetClass,
    pub shape: CollisionShape,
}

impl CollisionObject {
    pub fn from_target(target: &Target) -> Self {
        Self {
            id: target.id,
            class: target.class,
            shape: CollisionShape::for_target(target),
        }
    }
}

impl Footprint for CollisionObject {
    fn footprint(&self) -> Aabb {
        match self.shape {
            CollisionShape::Building(aabb) => aabb,
            other => {
                let r = other.bounding_radius();
                Aabb::from_center(other.center(), r, r)
            }
        }
    }
}

/// Static collision shapes, built once per world seed.
#[derive(Debug)]
pub struct CollisionIndex {
    grid: BlockGrid<CollisionObject>,
    max_radius: f32,
}

impl CollisionIndex {
    pub fn build(static_targets: &[Target], config: &CollisionConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let mut objects = Vec::with_capacity(static_targets.len());
        for t in static_targets {
            t.validate()?;
            objects.push(CollisionObject::from_target(t));
        }
        let max_radius = objects
            .iter()
            .map(|o| o.shape.bounding_radius())
            .fold(0.0_f32, f32::max);
        let grid = BlockGrid::build(objects, config.cell_stride);
        debug!(
            objects = grid.items().len(),
            cells = grid.cell_count(),
            max_radius,
            "built collision index"
        );
        Ok(Self { grid, max_radius })
    }

    /// Static shapes that could touch a vehicle of bounding radius `reach`
    /// centred at `center`.
    fn nearby(&self, center: Vec2, reach: f32) -> Vec<&CollisionObject> {
        self.grid.query(center.x, center.y, reach + self.max_radius)
    }

    pub fn objects(&self) -> &[CollisionObject] {
        self.grid.items()
    }

    pub fn len(&self) -> usize {
        self.grid.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-object scoring cooldowns. Owned by the caller and handed to
/// [`resolve`] every physics step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CooldownTable {
    entries: HashMap<ObjectId, u32>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every entry down by one frame, dropping the expired ones.
    pub fn tick(&mut self) {
        self.entries.retain(|_, frames| {
            *frames = frames.saturating_sub(1);
            *frames > 0
        });
    }

    pub fn arm(&mut self, id: ObjectId, frames: u32) {
        if frames > 0 {
            self.entries.insert(id, frames);
        }
    }

    pub fn is_cooling(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn remaining(&self, id: ObjectId) -> u32 {
        self.entries.get(&id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ObjectId,
    pub class: TargetClass,
    pub kind: ContactKind,
    /// True when this contact changed the score.
    pub scored: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionOutcome {
    pub corrected_pose: VehiclePose,
    pub score_delta: i32,
    pub contacts: Vec<Contact>,
}

/// One physics step of contact resolution.
///
/// Cooldowns tick first, so an object armed `n` frames ago with a window of
/// `n` is scoreable again on this call.
pub fn resolve(
    pose: &VehiclePose,
    index: &CollisionIndex,
    dynamic: &[Target],
    cooldowns: &mut CooldownTable,
    config: &CollisionConfig,
) -> CollisionOutcome {
    cooldowns.tick();

    let half = config.vehicle_half_extents();
    let reach = half.length();
    let start = pose.ground();

    let statics = index.nearby(start, reach);
    let actors: Vec<CollisionObject> = dynamic
        .iter()
        .filter(|t| t.visible)
        .map(CollisionObject::from_target)
        .filter(|o| o.shape.center().distance(start) <= reach + o.shape.bounding_radius())
        .collect();

    if statics.is_empty() && actors.is_empty() {
        return CollisionOutcome {
            corrected_pose: *pose,
            score_delta: 0,
            contacts: Vec::new(),
        };
    }

    let candidates: Vec<&CollisionObject> = statics.into_iter().chain(actors.iter()).collect();
    let mut position = start;
    let mut hard_stop = false;
    let mut slowdown = 0.0_f32;
    let mut score = 0;
    let mut contacts = Vec::new();

    for obj in &candidates {
        let vehicle = Obb::new(position, half, pose.heading);
        if obj.shape.center().distance(position) > reach + obj.shape.bounding_radius() {
            continue;
        }
        let Some(pen) = obj.shape.penetration(&vehicle) else {
            continue;
        };

        let kind = ContactKind::of(obj.class);
        match kind {
            ContactKind::Hard => {
                hard_stop = true;
                position += pen.pushback(config.pushback_margin);
            }
            ContactKind::Soft => slowdown += slowdown_fraction(obj.class),
        }
        score += record_contact(obj, kind, cooldowns, config, &mut contacts);
    }

    // Pushing out of one hard obstacle can nudge the car into another. Settle
    // pushes carry only a sliver of margin so a corridor barely wider than the
    // car still has room.
    if hard_stop {
        let settle_margin = config.pushback_margin.min(SETTLE_MARGIN);
        for _ in 0..MAX_SETTLE_PASSES {
            let mut moved = false;
            for obj in candidates
                .iter()
                .filter(|o| ContactKind::of(o.class) == ContactKind::Hard)
            {
                let vehicle = Obb::new(position, half, pose.heading);
                let Some(pen) = obj.shape.penetration(&vehicle) else {
                    continue;
                };
                position += pen.pushback(settle_margin);
                moved = true;
                if !contacts.iter().any(|c| c.id == obj.id) {
                    score +=
                        record_contact(obj, ContactKind::Hard, cooldowns, config, &mut contacts);
                }
            }
            if !moved {
                break;
            }
        }

        // Soft objects the pushes moved the car into.
        let vehicle = Obb::new(position, half, pose.heading);
        for obj in candidates
            .iter()
            .filter(|o| ContactKind::of(o.class) == ContactKind::Soft)
        {
            let fresh = !contacts.iter().any(|c| c.id == obj.id);
            if fresh && obj.shape.penetration(&vehicle).is_some() {
                score += record_contact(obj, ContactKind::Soft, cooldowns, config, &mut contacts);
            }
        }
    }

    let speed = if hard_stop {
        0.0
    } else {
        pose.speed * (1.0 - slowdown).max(0.0)
    };
    let position = position.clamp(
        Vec2::splat(config.world_min),
        Vec2::splat(config.world_max),
    );

    trace!(
        candidates = candidates.len(),
        contacts = contacts.len(),
        score,
        "collision step"
    );
    CollisionOutcome {
        corrected_pose: VehiclePose {
            position: Vec3::new(position.x, pose.position.y, position.y),
            heading: pose.heading,
            speed,
        },
        score_delta: score,
        contacts,
    }
}

/// Log one contact, scoring it unless the object is cooling down. Returns the
/// score change.
fn record_contact(
    obj: &CollisionObject,
    kind: ContactKind,
    cooldowns: &mut CooldownTable,
    config: &CollisionConfig,
    contacts: &mut Vec<Contact>,
) -> i32 {
    let scored = !cooldowns.is_cooling(obj.id);
    let mut delta = 0;
    if scored {
        delta = score_delta(obj.class);
        cooldowns.arm(obj.id, config.cooldown_frames);
        debug!(id = %obj.id, class = %obj.class, delta, "collision scored");
    }
    contacts.push(Contact {
        id: obj.id,
        class: obj.class,
        kind,
        scored,
    });
    delta
}
