//! One driving session: the static world, the per-frame actors and the little
//! mutable state the core owns (sweep angle, hit cooldowns, RNG).

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::acoustic::{self, AcousticReading};
use crate::collision::{self, CollisionIndex, CollisionOutcome, CooldownTable};
use crate::config::PerceptionConfig;
use crate::environment::{TimeOfDay, VehiclePose, Weather};
use crate::error::WorldError;
use crate::geometry::Aabb;
use crate::index::{FrameTargets, SpatialIndex};
use crate::lidar::{RangeScan, RangeSensor, RangeSettings};
use crate::scene::{BoxScene, Layered, SceneIntersect};
use crate::schedule::DueSensors;
use crate::target::{ObjectId, Target};
use crate::thermal::{self, ThermalReading};
use crate::vision::{self, Conditions, VisionReading};

pub struct Perception {
    config: PerceptionConfig,
    index: SpatialIndex,
    collision: CollisionIndex,
    cooldowns: CooldownTable,
    range: RangeSensor,
    scene: BoxScene,
    seed: Option<u64>,
    rng: StdRng,
    dynamic: Vec<Target>,
    pose: VehiclePose,
    weather: Weather,
    time_of_day: TimeOfDay,
}

impl Perception {
    /// Build the indices for a freshly seeded world.
    ///
    /// With `seed` every jittered reading is reproducible; without it the RNG
    /// is seeded from OS entropy.
    pub fn new(
        static_targets: Vec<Target>,
        config: PerceptionConfig,
        seed: Option<u64>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let collision = CollisionIndex::build(&static_targets, &config.collision)?;
        let index = SpatialIndex::build(static_targets, &config.index)?;
        let scene = BoxScene::from_targets(index.targets()).with_ground(0.0);
        info!(
            targets = index.len(),
            obstacles = collision.len(),
            solids = scene.len(),
            seeded = seed.is_some(),
            "perception session ready"
        );
        Ok(Self {
            range: RangeSensor::new(config.range.clone()),
            config,
            index,
            collision,
            cooldowns: CooldownTable::new(),
            scene,
            seed,
            rng: seeded_rng(seed),
            dynamic: Vec::new(),
            pose: VehiclePose::default(),
            weather: Weather::default(),
            time_of_day: TimeOfDay::default(),
        })
    }

    /// Same as [`Perception::new`] with the world and the config as JSON.
    pub fn from_json(
        static_targets: &str,
        config: Option<&str>,
        seed: Option<u64>,
    ) -> Result<Self, WorldError> {
        let targets: Vec<Target> = serde_json::from_str(static_targets)?;
        let config = match config {
            Some(raw) => PerceptionConfig::from_json(raw)?,
            None => PerceptionConfig::default(),
        };
        Self::new(targets, config, seed)
    }

    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn pose(&self) -> VehiclePose {
        self.pose
    }

    pub fn set_pose(&mut self, pose: VehiclePose) {
        self.pose = pose;
    }

    pub fn weather(&self) -> Weather {
        self.weather
    }

    pub fn set_weather(&mut self, weather: Weather) {
        self.weather = weather;
    }

    pub fn set_time_of_day(&mut self, time_of_day: TimeOfDay) {
        self.time_of_day = time_of_day;
    }

    pub fn sweep_angle(&self) -> f32 {
        self.range.sweep_angle()
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }

    /// Replace this frame's actors. All-or-nothing: on error the previous set
    /// stays in place.
    pub fn set_dynamic(&mut self, targets: Vec<Target>) -> Result<(), WorldError> {
        for t in &targets {
            t.validate()?;
            if !matches!(t.id, ObjectId::Dynamic(_)) {
                return Err(WorldError::invalid_target(t.id, "static id among dynamic targets"));
            }
        }
        self.dynamic = targets;
        Ok(())
    }

    pub fn set_dynamic_json(&mut self, raw: &str) -> Result<(), WorldError> {
        let targets: Vec<Target> = serde_json::from_str(raw)?;
        self.set_dynamic(targets)
    }

    pub fn dynamic(&self) -> &[Target] {
        &self.dynamic
    }

    pub fn frame(&self) -> FrameTargets<'_> {
        FrameTargets::new(&self.index, &self.dynamic)
    }

    fn occluders(&self, radius: f32) -> Vec<Aabb> {
        let origin = self.pose.ground();
        self.index.occluders_within(origin.x, origin.y, radius)
    }

    /// Boxes for the static world over a ground plane at `y = 0`, built once.
    pub fn box_scene(&self) -> &BoxScene {
        &self.scene
    }

    pub fn range_tick<S>(&mut self, scene: &S, settings: RangeSettings, dt: f32) -> RangeScan
    where
        S: SceneIntersect + ?Sized,
    {
        self.range
            .tick(&self.pose, scene, settings, self.weather, dt, &mut self.rng)
    }

    /// Range scan against the built-in boxes: the prebuilt static scene plus
    /// this frame's visible actors.
    pub fn builtin_range_tick(&mut self, settings: RangeSettings, dt: f32) -> RangeScan {
        let actors = BoxScene::from_targets(&self.dynamic);
        let scene = Layered {
            base: &self.scene,
            overlay: &actors,
        };
        self.range
            .tick(&self.pose, &scene, settings, self.weather, dt, &mut self.rng)
    }

    pub fn thermal_tick(&self) -> ThermalReading {
        let cfg = &self.config.thermal;
        let occluders = self.occluders(cfg.range);
        thermal::tick(&self.pose, &self.frame(), self.weather, &occluders, cfg)
    }

    pub fn acoustic_tick(&self) -> AcousticReading {
        acoustic::tick(&self.pose, &self.frame(), self.weather, &self.config.acoustic)
    }

    pub fn vision_tick(&mut self) -> VisionReading {
        let cfg = &self.config.vision;
        let occluders = self.occluders(cfg.max_range);
        let conditions = Conditions {
            time_of_day: self.time_of_day,
            weather: self.weather,
        };
        let frame = FrameTargets::new(&self.index, &self.dynamic);
        vision::tick(&self.pose, &frame, conditions, &occluders, cfg, &mut self.rng)
    }

    /// Resolve contacts for the current pose and adopt the corrected pose.
    pub fn resolve_collisions(&mut self) -> CollisionOutcome {
        let outcome = collision::resolve(
            &self.pose,
            &self.collision,
            &self.dynamic,
            &mut self.cooldowns,
            &self.config.collision,
        );
        self.pose = outcome.corrected_pose;
        outcome
    }

    pub fn due_sensors(&self, frame: u64) -> DueSensors {
        self.config.schedule.due(frame)
    }

    /// Start a new run on the same world. A seeded session replays from the
    /// top after a reset.
    pub fn reset(&mut self) {
        self.range.reset();
        self.rng = seeded_rng(self.seed);
        self.cooldowns.clear();
        self.dynamic.clear();
        self.pose = VehiclePose::default();
        debug!("perception session reset");
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
