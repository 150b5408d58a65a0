//! Perception and collision core for a procedural city driving game.
//!
//! The host renders the city and runs the car physics. Each frame it hands
//! this crate the vehicle pose and the actors it moved, and gets back range
//! points, thermal blobs, acoustic sources, camera detections and a corrected
//! pose with a score delta. The static world is indexed once per seed.

mod acoustic;
mod collision;
mod config;
mod environment;
mod error;
mod geometry;
mod index;
mod lidar;
mod sat;
mod scene;
mod schedule;
mod session;
mod target;
mod thermal;
mod vision;

use glam::Vec3;
use tracing::warn;
use wasm_bindgen::prelude::*;

pub use acoustic::{AcousticConfig, AcousticReading, AcousticSource};
pub use collision::{
    resolve, CollisionConfig, CollisionIndex, CollisionObject, CollisionOutcome, CollisionShape,
    Contact, ContactKind, CooldownTable,
};
pub use config::PerceptionConfig;
pub use environment::{TimeOfDay, VehiclePose, Weather};
pub use error::WorldError;
pub use geometry::{bearing, ground_distance, line_of_sight, normalize_angle, Aabb};
pub use index::{FrameTargets, IndexConfig, SpatialIndex};
pub use lidar::{ColorBucket, RangeConfig, RangePoint, RangeScan, RangeSensor, RangeSettings};
pub use sat::{Obb, Penetration};
pub use scene::{BoxScene, Layered, SceneHit, SceneIntersect, SolidBox};
pub use schedule::{Cadence, DueSensors, SensorSchedule};
pub use session::Perception;
pub use target::{Bounds, FreqBand, ObjectId, SoundKind, SoundSignature, Target, TargetClass};
pub use thermal::{ThermalBlob, ThermalConfig, ThermalReading};
pub use vision::{Conditions, Detection, ViewConfig, VisionConfig, VisionReading};

/// Ray queries answered by a JS function
/// `(ox, oy, oz, dx, dy, dz) => distance | undefined`.
struct JsScene<'a> {
    callback: &'a js_sys::Function,
}

impl SceneIntersect for JsScene<'_> {
    fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<SceneHit> {
        let args = js_sys::Array::new();
        for v in [origin.x, origin.y, origin.z, direction.x, direction.y, direction.z] {
            args.push(&JsValue::from_f64(f64::from(v)));
        }
        let result = match self.callback.apply(&JsValue::NULL, &args) {
            Ok(value) => value,
            Err(err) => {
                warn!(?err, "scene intersect callback threw");
                return None;
            }
        };
        let distance = result.as_f64()? as f32;
        Some(SceneHit {
            distance,
            point: origin + direction * distance,
        })
    }
}

/// The perception core as exposed to JavaScript. Readings come back as JSON
/// strings with camelCase fields.
#[wasm_bindgen]
pub struct PerceptionCore {
    inner: Perception,
}

#[wasm_bindgen]
impl PerceptionCore {
    /// Create a session.
    ///
    /// * `static_targets` – JSON array of the world's static targets.
    /// * `config`         – Optional JSON overrides for [`PerceptionConfig`].
    /// * `seed`           – Optional RNG seed for replayable jitter.
    #[wasm_bindgen(constructor)]
    pub fn new(
        static_targets: &str,
        config: Option<String>,
        seed: Option<u64>,
    ) -> Result<PerceptionCore, JsError> {
        let inner = Perception::from_json(static_targets, config.as_deref(), seed)?;
        Ok(PerceptionCore { inner })
    }

    pub fn set_pose(&mut self, x: f32, y: f32, z: f32, heading: f32, speed: f32) {
        self.inner
            .set_pose(VehiclePose::new(Vec3::new(x, y, z), heading, speed));
    }

    /// `"clear"`, `"rain"` or `"fog"`.
    pub fn set_weather(&mut self, weather: &str) -> Result<(), JsError> {
        let weather: Weather = weather.parse().map_err(|e: String| JsError::new(&e))?;
        self.inner.set_weather(weather);
        Ok(())
    }

    /// Clock hour in `[0, 24)`.
    pub fn set_hour(&mut self, hour: f32) {
        self.inner.set_time_of_day(TimeOfDay::from_hour(hour));
    }

    /// Replace this frame's dynamic targets (JSON array).
    pub fn set_dynamic_targets(&mut self, targets: &str) -> Result<(), JsError> {
        self.inner.set_dynamic_json(targets)?;
        Ok(())
    }

    /// Run a range scan. Without `intersect` the scan runs against the
    /// built-in box scene of the indexed targets.
    pub fn range_tick(
        &mut self,
        ray_count: u32,
        dt: f32,
        intersect: Option<js_sys::Function>,
    ) -> Result<String, JsError> {
        let settings = RangeSettings { ray_count };
        let scan = match intersect.as_ref() {
            Some(callback) => self.inner.range_tick(&JsScene { callback }, settings, dt),
            None => self.inner.builtin_range_tick(settings, dt),
        };
        Ok(serde_json::to_string(&scan)?)
    }

    pub fn thermal_tick(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.inner.thermal_tick())?)
    }

    pub fn acoustic_tick(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.inner.acoustic_tick())?)
    }

    pub fn vision_tick(&mut self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.inner.vision_tick())?)
    }

    /// Resolve contacts at the current pose. The corrected pose is adopted
    /// and returned together with the score delta and the contact list.
    pub fn resolve_collisions(&mut self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.inner.resolve_collisions())?)
    }

    pub fn due_sensors(&self, frame: u32) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.inner.due_sensors(u64::from(frame)))?)
    }

    pub fn sweep_angle(&self) -> f32 {
        self.inner.sweep_angle()
    }

    /// Clears the sweep angle, the hit cooldowns and the dynamic targets, and
    /// re-seeds the jitter RNG.
    pub fn reset(&mut self) {
        self.inner.reset();
    }
}
