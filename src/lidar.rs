//! Rotating multi-layer range sensor ("LiDAR").
//!
//! Each tick fires `ray_count × layers` rays around the vehicle. The horizontal
//! pattern is offset by a sweep angle that keeps advancing between ticks, so
//! consecutive sparse scans interleave into a dense picture.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::environment::{VehiclePose, Weather};
use crate::scene::SceneIntersect;

/// Range sensor constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RangeConfig {
    /// Maximum valid range in clear weather, metres.
    pub max_range: f32,
    /// Range multiplier applied in fog.
    pub fog_factor: f32,
    /// Sweep rotation rate in revolutions per second.
    pub sweep_speed: f32,
    /// Fixed elevation of each vertical layer, degrees (negative looks down).
    pub layer_tilts_deg: Vec<f32>,
    /// Sensor height above the vehicle origin, metres.
    pub mount_height: f32,
    /// Half-width of the uniform range jitter in rain, metres.
    pub rain_noise_meters: f32,
    /// Floor applied to jittered distances, metres.
    pub min_distance: f32,
    /// Upper bound of the `close` colour bucket, metres.
    pub close_threshold: f32,
    /// Upper bound of the `mid` colour bucket, metres.
    pub mid_threshold: f32,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            max_range: 60.0,
            fog_factor: 0.5,
            sweep_speed: 0.5,
            layer_tilts_deg: vec![-8.0, -3.0, 1.0, 5.0],
            mount_height: 1.6,
            rain_noise_meters: 0.3,
            min_distance: 0.5,
            close_threshold: 10.0,
            mid_threshold: 30.0,
        }
    }
}

impl RangeConfig {
    pub fn vertical_layers(&self) -> usize {
        self.layer_tilts_deg.len()
    }

    pub fn effective_range(&self, weather: Weather) -> f32 {
        match weather {
            Weather::Fog => self.max_range * self.fog_factor,
            Weather::Clear | Weather::Rain => self.max_range,
        }
    }

    pub fn bucket(&self, distance: f32) -> ColorBucket {
        if distance < self.close_threshold {
            ColorBucket::Close
        } else if distance < self.mid_threshold {
            ColorBucket::Mid
        } else {
            ColorBucket::Far
        }
    }

    /// World-space unit directions for one scan, layer-major.
    ///
    /// Sample `i` points at yaw `heading + i * 2π / ray_count + sweep_angle`.
    pub fn ray_directions(&self, heading: f32, sweep_angle: f32, ray_count: u32) -> Vec<Vec3> {
        if ray_count == 0 {
            return Vec::new();
        }
        let step = TAU / ray_count as f32;
        let mut directions = Vec::with_capacity(ray_count as usize * self.vertical_layers());
        for tilt_deg in &self.layer_tilts_deg {
            let tilt = tilt_deg.to_radians();
            let (sin_t, cos_t) = tilt.sin_cos();
            for i in 0..ray_count {
                let yaw = heading + i as f32 * step + sweep_angle;
                let (sin_y, cos_y) = yaw.sin_cos();
                directions.push(Vec3::new(cos_t * sin_y, sin_t, cos_t * cos_y));
            }
        }
        directions
    }
}

/// Per-call knobs chosen by the host (quality settings).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSettings {
    pub ray_count: u32,
}

impl Default for RangeSettings {
    fn default() -> Self {
        Self { ray_count: 120 }
    }
}

/// Distance band used to colour a point downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorBucket {
    Close,
    Mid,
    Far,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub distance: f32,
    pub color_bucket: ColorBucket,
}

/// Output of a single scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeScan {
    pub points: Vec<RangePoint>,
    /// Sweep angle after this tick; feed it back as `prev_sweep_angle`.
    pub sweep_angle: f32,
    pub effective_range: f32,
}

/// Execute one range scan against the host's scene.
///
/// * `prev_sweep_angle` – sweep carried from the previous tick.
/// * `dt`               – seconds since the previous tick.
/// * `rng`              – source for rain jitter; seed it for replayable runs.
#[allow(clippy::too_many_arguments)]
pub fn scan<S, R>(
    pose: &VehiclePose,
    scene: &S,
    settings: RangeSettings,
    weather: Weather,
    prev_sweep_angle: f32,
    dt: f32,
    config: &RangeConfig,
    rng: &mut R,
) -> RangeScan
where
    S: SceneIntersect + ?Sized,
    R: Rng + ?Sized,
{
    let effective_range = config.effective_range(weather);
    let advance = config.sweep_speed * TAU * dt.max(0.0);
    let sweep_angle = (prev_sweep_angle + advance).rem_euclid(TAU);

    let origin = pose.position + Vec3::Y * config.mount_height;
    let directions = config.ray_directions(pose.heading, sweep_angle, settings.ray_count);

    let jitter = (weather == Weather::Rain && config.rain_noise_meters > 0.0)
        .then(|| Uniform::new_inclusive(-config.rain_noise_meters, config.rain_noise_meters));

    let mut points = Vec::with_capacity(directions.len());
    for dir in &directions {
        let Some(hit) = scene.intersect(origin, *dir) else {
            continue;
        };
        if !hit.distance.is_finite() || hit.distance < 0.0 {
            warn!(distance = hit.distance, "scene intersection returned an unusable distance");
            continue;
        }
        let mut distance = hit.distance;
        if let Some(noise) = jitter.as_ref() {
            distance = (distance + noise.sample(rng)).max(config.min_distance);
        }
        if distance > effective_range {
            continue;
        }
        let p = origin + *dir * distance;
        points.push(RangePoint {
            x: p.x,
            y: p.y,
            z: p.z,
            distance,
            color_bucket: config.bucket(distance),
        });
    }

    trace!(rays = directions.len(), points = points.len(), "range scan");
    RangeScan {
        points,
        sweep_angle,
        effective_range,
    }
}

/// Range sensor that owns its sweep-angle accumulator.
#[derive(Clone, Debug)]
pub struct RangeSensor {
    config: RangeConfig,
    sweep_angle: f32,
}

impl RangeSensor {
    pub fn new(config: RangeConfig) -> Self {
        Self {
            config,
            sweep_angle: 0.0,
        }
    }

    pub fn config(&self) -> &RangeConfig {
        &self.config
    }

    pub fn sweep_angle(&self) -> f32 {
        self.sweep_angle
    }

    /// Scan and advance the sweep.
    pub fn tick<S, R>(
        &mut self,
        pose: &VehiclePose,
        scene: &S,
        settings: RangeSettings,
        weather: Weather,
        dt: f32,
        rng: &mut R,
    ) -> RangeScan
    where
        S: SceneIntersect + ?Sized,
        R: Rng + ?Sized,
    {
        let result = scan(
            pose,
            scene,
            settings,
            weather,
            self.sweep_angle,
            dt,
            &self.config,
            rng,
        );
        self.sweep_angle = result.sweep_angle;
        result
    }

    /// Session reset; the only time the sweep returns to zero.
    pub fn reset(&mut self) {
        self.sweep_angle = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::scene::{BoxScene, SceneHit, SolidBox};

    fn flat_config() -> RangeConfig {
        RangeConfig {
            layer_tilts_deg: vec![0.0],
            mount_height: 1.0,
            ..RangeConfig::default()
        }
    }

    /// Every ray hits a surface `d` metres away.
    fn constant_wall(d: f32) -> impl Fn(Vec3, Vec3) -> Option<SceneHit> {
        move |origin: Vec3, dir: Vec3| {
            Some(SceneHit {
                distance: d,
                point: origin + dir * d,
            })
        }
    }

    #[test]
    fn direction_count_and_unit_length() {
        let cfg = RangeConfig::default();
        let dirs = cfg.ray_directions(0.3, 1.1, 36);
        assert_eq!(dirs.len(), 36 * cfg.vertical_layers());
        for d in &dirs {
            assert!((d.length() - 1.0).abs() < 1e-5, "length {}", d.length());
        }
    }

    #[test]
    fn first_ray_follows_heading_plus_sweep() {
        let cfg = flat_config();
        let dirs = cfg.ray_directions(0.0, 0.0, 8);
        assert!((dirs[0] - Vec3::Z).length() < 1e-6, "heading 0 looks down +Z");
        let dirs = cfg.ray_directions(0.25, 0.5, 8);
        let yaw = 0.75_f32;
        assert!((dirs[0] - Vec3::new(yaw.sin(), 0.0, yaw.cos())).length() < 1e-6);
    }

    #[test]
    fn sweep_angle_accumulates_across_ticks() {
        let cfg = flat_config();
        let mut sensor = RangeSensor::new(cfg.clone());
        let mut rng = StdRng::seed_from_u64(1);
        let scene = constant_wall(5.0);
        let pose = VehiclePose::default();
        let a = sensor.tick(
            &pose,
            &scene,
            RangeSettings { ray_count: 4 },
            Weather::Clear,
            0.1,
            &mut rng,
        );
        let b = sensor.tick(
            &pose,
            &scene,
            RangeSettings { ray_count: 4 },
            Weather::Clear,
            0.1,
            &mut rng,
        );
        let step = cfg.sweep_speed * TAU * 0.1;
        assert!((a.sweep_angle - step).abs() < 1e-6);
        assert!((b.sweep_angle - 2.0 * step).abs() < 1e-6);
        sensor.reset();
        assert_eq!(sensor.sweep_angle(), 0.0);
    }

    #[test]
    fn fog_shrinks_effective_range_and_drops_far_hits() {
        let cfg = flat_config();
        let mut rng = StdRng::seed_from_u64(2);
        let pose = VehiclePose::default();
        let scene = constant_wall(45.0);
        let clear = scan(
            &pose,
            &scene,
            RangeSettings { ray_count: 10 },
            Weather::Clear,
            0.0,
            0.0,
            &cfg,
            &mut rng,
        );
        assert_eq!(clear.points.len(), 10);
        assert_eq!(clear.effective_range, 60.0);

        let fog = scan(
            &pose,
            &scene,
            RangeSettings { ray_count: 10 },
            Weather::Fog,
            0.0,
            0.0,
            &cfg,
            &mut rng,
        );
        assert_eq!(fog.effective_range, 30.0);
        assert!(fog.points.is_empty(), "45 m hits are beyond the 30 m fog range");
    }

    #[test]
    fn rain_jitter_is_bounded_and_floored() {
        let cfg = flat_config();
        let mut rng = StdRng::seed_from_u64(3);
        let pose = VehiclePose::default();

        let scene = constant_wall(20.0);
        let wet = scan(
            &pose,
            &scene,
            RangeSettings { ray_count: 200 },
            Weather::Rain,
            0.0,
            0.0,
            &cfg,
            &mut rng,
        );
        assert_eq!(wet.points.len(), 200);
        assert!(wet.points.iter().any(|p| p.distance != 20.0));
        for p in &wet.points {
            assert!((p.distance - 20.0).abs() <= cfg.rain_noise_meters + 1e-5);
        }

        let scene = constant_wall(0.6);
        let near = scan(
            &pose,
            &scene,
            RangeSettings { ray_count: 200 },
            Weather::Rain,
            0.0,
            0.0,
            &cfg,
            &mut rng,
        );
        assert!(near.points.iter().all(|p| p.distance >= cfg.min_distance));
    }

    #[test]
    fn rain_pushing_a_hit_past_range_drops_it() {
        let cfg = flat_config();
        let mut rng = StdRng::seed_from_u64(11);
        let range = cfg.effective_range(Weather::Rain);
        let scene = constant_wall(range - 0.1);
        let wet = scan(
            &VehiclePose::default(),
            &scene,
            RangeSettings { ray_count: 400 },
            Weather::Rain,
            0.0,
            0.0,
            &cfg,
            &mut rng,
        );
        assert!(wet.points.iter().all(|p| p.distance <= range));
        assert!(wet.points.len() < 400, "some jittered hits land beyond range");
        assert!(wet.points.len() > 200, "most stay inside");
    }

    #[test]
    fn sweep_angle_wraps_into_one_turn() {
        let cfg = flat_config();
        let mut rng = StdRng::seed_from_u64(4);
        let result = scan(
            &VehiclePose::default(),
            &constant_wall(5.0),
            RangeSettings { ray_count: 4 },
            Weather::Clear,
            6.0,
            0.2,
            &cfg,
            &mut rng,
        );
        let expected = 6.0 + cfg.sweep_speed * TAU * 0.2 - TAU;
        assert!((result.sweep_angle - expected).abs() < 1e-5);
        assert!((0.0..TAU).contains(&result.sweep_angle));
    }

    #[test]
    fn points_are_bucketed_by_distance() {
        let cfg = flat_config();
        assert_eq!(cfg.bucket(3.0), ColorBucket::Close);
        assert_eq!(cfg.bucket(10.0), ColorBucket::Mid);
        assert_eq!(cfg.bucket(29.9), ColorBucket::Mid);
        assert_eq!(cfg.bucket(30.0), ColorBucket::Far);

        let mut rng = StdRng::seed_from_u64(4);
        let scan = scan(
            &VehiclePose::default(),
            &constant_wall(35.0),
            RangeSettings { ray_count: 3 },
            Weather::Clear,
            0.0,
            0.0,
            &cfg,
            &mut rng,
        );
        assert!(scan.points.iter().all(|p| p.color_bucket == ColorBucket::Far));
    }

    #[test]
    fn scan_against_box_scene_reports_world_points() {
        let cfg = flat_config();
        let mut scene = BoxScene::new();
        // Wall across +Z, 8 m ahead of the sensor.
        scene.push(SolidBox::new(Vec3::new(-50.0, 0.0, 8.0), Vec3::new(50.0, 5.0, 9.0)));
        let mut rng = StdRng::seed_from_u64(5);
        let result = scan(
            &VehiclePose::default(),
            &scene,
            RangeSettings { ray_count: 4 },
            Weather::Clear,
            0.0,
            0.0,
            &cfg,
            &mut rng,
        );
        // Only the forward ray of the four cardinal rays meets the wall.
        assert_eq!(result.points.len(), 1);
        let p = result.points[0];
        assert!((p.z - 8.0).abs() < 1e-4);
        assert!((p.y - 1.0).abs() < 1e-4);
        assert!((p.distance - 8.0).abs() < 1e-4);
        assert_eq!(p.color_bucket, ColorBucket::Close);
    }

    #[test]
    fn unusable_hits_are_skipped() {
        let cfg = flat_config();
        let mut rng = StdRng::seed_from_u64(6);
        let scene = |_: Vec3, _: Vec3| {
            Some(SceneHit {
                distance: f32::NAN,
                point: Vec3::ZERO,
            })
        };
        let result = scan(
            &VehiclePose::default(),
            &scene,
            RangeSettings { ray_count: 5 },
            Weather::Clear,
            0.0,
            0.0,
            &cfg,
            &mut rng,
        );
        assert!(result.points.is_empty());
    }
}
