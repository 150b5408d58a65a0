use std::fmt;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::geometry::Aabb;

/// Session-unique identity of a perceivable object.
///
/// Static world furniture and per-frame actors live in separate id spaces, so
/// the collision cooldown table can key both without numeric offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectId {
    Static(u32),
    Dynamic(u32),
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Static(n) => write!(f, "static#{n}"),
            ObjectId::Dynamic(n) => write!(f, "dynamic#{n}"),
        }
    }
}

/// Closed set of object classes. Every sensor constant and collision shape is
/// chosen by matching on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetClass {
    Building,
    Cone,
    Barrier,
    Pole,
    Sign,
    TrafficLight,
    Pedestrian,
    Vehicle,
    Emergency,
    Animal,
    Ball,
}

impl TargetClass {
    pub fn label(self) -> &'static str {
        match self {
            TargetClass::Building => "building",
            TargetClass::Cone => "cone",
            TargetClass::Barrier => "barrier",
            TargetClass::Pole => "pole",
            TargetClass::Sign => "sign",
            TargetClass::TrafficLight => "traffic_light",
            TargetClass::Pedestrian => "pedestrian",
            TargetClass::Vehicle => "vehicle",
            TargetClass::Emergency => "emergency",
            TargetClass::Animal => "animal",
            TargetClass::Ball => "ball",
        }
    }

    /// Buildings block line of sight and are exempt from occlusion themselves.
    pub fn is_occluder(self) -> bool {
        matches!(self, TargetClass::Building)
    }

    /// Traffic lights hang over the carriageway between blocks, so the index
    /// keeps them in its global list instead of a block cell.
    pub fn is_block_bound(self) -> bool {
        !matches!(self, TargetClass::TrafficLight)
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Local extents: half-width along local X, half-depth along local Z, full height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub half_width: f32,
    pub half_depth: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(half_width: f32, half_depth: f32, height: f32) -> Self {
        Self {
            half_width,
            half_depth,
            height,
        }
    }
}

/// Kind of noise a target emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Engine,
    Siren,
    Horn,
    Footsteps,
    Voice,
    Bark,
    Rolling,
    Hum,
}

/// Coarse spectral band reported by the acoustic sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreqBand {
    Low,
    Mid,
    High,
}

impl SoundKind {
    pub fn freq_band(self) -> FreqBand {
        match self {
            SoundKind::Engine | SoundKind::Rolling | SoundKind::Hum => FreqBand::Low,
            SoundKind::Footsteps | SoundKind::Voice | SoundKind::Bark => FreqBand::Mid,
            SoundKind::Siren | SoundKind::Horn => FreqBand::High,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SoundKind::Engine => "engine",
            SoundKind::Siren => "siren",
            SoundKind::Horn => "horn",
            SoundKind::Footsteps => "footsteps",
            SoundKind::Voice => "voice",
            SoundKind::Bark => "bark",
            SoundKind::Rolling => "rolling",
            SoundKind::Hum => "hum",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundSignature {
    pub kind: SoundKind,
    /// Intensity at the source, before distance falloff.
    pub intensity: f32,
}

/// A static or dynamic object the sensors and the collision engine can see.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: ObjectId,
    pub class: TargetClass,
    pub position: Vec3,
    pub bounds: Bounds,
    /// Yaw of the local box, radians. Only barriers use it for collision.
    #[serde(default)]
    pub rotation: f32,
    /// Footprint of occluding geometry. Required for buildings.
    #[serde(default)]
    pub aabb: Option<Aabb>,
    pub thermal_signature: f32,
    #[serde(default)]
    pub sound_signature: Option<SoundSignature>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Target {
    pub fn new(
        id: ObjectId,
        class: TargetClass,
        position: Vec3,
        bounds: Bounds,
        thermal_signature: f32,
    ) -> Self {
        Self {
            id,
            class,
            position,
            bounds,
            rotation: 0.0,
            aabb: None,
            thermal_signature,
            sound_signature: None,
            visible: true,
        }
    }

    /// A building whose footprint is `aabb` and whose height is `height`.
    pub fn building(id: u32, aabb: Aabb, height: f32, thermal_signature: f32) -> Self {
        let c = aabb.center();
        let half = aabb.half_extents();
        Self::new(
            ObjectId::Static(id),
            TargetClass::Building,
            Vec3::new(c.x, 0.0, c.y),
            Bounds::new(half.x, half.y, height),
            thermal_signature,
        )
        .with_aabb(aabb)
    }

    pub fn with_aabb(mut self, aabb: Aabb) -> Self {
        self.aabb = Some(aabb);
        self
    }

    pub fn with_sound(mut self, kind: SoundKind, intensity: f32) -> Self {
        self.sound_signature = Some(SoundSignature { kind, intensity });
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Position on the ground plane (`Vec2::y` holds world Z).
    pub fn ground(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }

    /// Conservative ground-plane box that contains the whole object.
    pub fn footprint(&self) -> Aabb {
        if let Some(aabb) = self.aabb {
            return aabb;
        }
        let (hx, hz) = if self.rotation == 0.0 {
            (self.bounds.half_width, self.bounds.half_depth)
        } else {
            let r = Vec2::new(self.bounds.half_width, self.bounds.half_depth).length();
            (r, r)
        };
        Aabb::from_center(self.ground(), hx, hz)
    }

    /// Reject targets a tick could not reason about.
    pub fn validate(&self) -> Result<(), WorldError> {
        let id = self.id;
        if !self.position.is_finite() {
            return Err(WorldError::invalid_target(id, "non-finite position"));
        }
        let b = self.bounds;
        if !(b.half_width > 0.0 && b.half_depth > 0.0 && b.height > 0.0)
            || !(b.half_width.is_finite() && b.half_depth.is_finite() && b.height.is_finite())
        {
            return Err(WorldError::invalid_target(id, "bounds must be positive and finite"));
        }
        if !self.rotation.is_finite() {
            return Err(WorldError::invalid_target(id, "non-finite rotation"));
        }
        if !self.thermal_signature.is_finite() {
            return Err(WorldError::invalid_target(id, "non-finite thermal signature"));
        }
        if let Some(sound) = self.sound_signature {
            if !(sound.intensity.is_finite() && sound.intensity >= 0.0) {
                return Err(WorldError::invalid_target(id, "sound intensity must be >= 0"));
            }
        }
        match (self.class, self.aabb) {
            (TargetClass::Building, None) => {
                Err(WorldError::invalid_target(id, "building without an aabb"))
            }
            (_, Some(aabb)) if !aabb.is_well_formed() => {
                Err(WorldError::invalid_target(id, "inverted or non-finite aabb"))
            }
            _ => Ok(()),
        }
    }
}
