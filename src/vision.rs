//! Multi-view camera object detector.
//!
//! Each configured view is a pinhole camera yawed off the vehicle heading.
//! Targets inside the view's range, field of view and line of sight are
//! projected to normalised viewport coordinates and scored with a confidence
//! model that degrades with darkness, weather and distance.

use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_2, PI};

use glam::Vec3;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::environment::{TimeOfDay, VehiclePose, Weather};
use crate::geometry::{bearing, ground_distance, line_of_sight, Aabb};
use crate::index::FrameTargets;
use crate::target::{Target, TargetClass};

/// One camera mounted on the vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfig {
    pub id: String,
    /// Yaw relative to the vehicle heading, radians. Positive turns right.
    pub heading_offset: f32,
    /// Horizontal field of view, degrees.
    pub fov_deg: f32,
    /// Viewport width / height.
    #[serde(default = "default_aspect")]
    pub aspect: f32,
}

fn default_aspect() -> f32 {
    16.0 / 9.0
}

impl ViewConfig {
    pub fn new(id: impl Into<String>, heading_offset: f32, fov_deg: f32) -> Self {
        Self {
            id: id.into(),
            heading_offset,
            fov_deg,
            aspect: default_aspect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisionConfig {
    pub max_range: f32,
    pub views: Vec<ViewConfig>,
    /// Camera height above the vehicle origin, metres.
    pub camera_height: f32,
    /// Targets closer than this along the optical axis are behind the lens.
    pub near_epsilon: f32,
    /// Largest bounding-box edge as a fraction of the viewport.
    pub max_box_fraction: f32,
    /// Half-width of the uniform confidence jitter.
    pub jitter: f32,
    pub dusk_multiplier: f32,
    pub night_multiplier: f32,
    pub rain_penalty: f32,
    pub fog_penalty: f32,
    /// Confidence lost at `max_range`, scaled linearly with distance.
    pub distance_attenuation: f32,
    pub min_confidence: f32,
    pub max_confidence: f32,
    /// Detections scoring below this are dropped.
    pub detection_threshold: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            max_range: 50.0,
            views: vec![
                ViewConfig::new("front", 0.0, 75.0),
                ViewConfig::new("rear", PI, 90.0),
                ViewConfig::new("left", -FRAC_PI_2, 90.0),
                ViewConfig::new("right", FRAC_PI_2, 90.0),
            ],
            camera_height: 1.2,
            near_epsilon: 0.1,
            max_box_fraction: 0.8,
            jitter: 0.05,
            dusk_multiplier: 0.7,
            night_multiplier: 0.25,
            rain_penalty: 0.1,
            fog_penalty: 0.2,
            distance_attenuation: 0.4,
            min_confidence: 0.05,
            max_confidence: 0.99,
            detection_threshold: 0.15,
        }
    }
}

impl VisionConfig {
    pub fn time_of_day_multiplier(&self, time: TimeOfDay) -> f32 {
        match time {
            TimeOfDay::Daylight => 1.0,
            TimeOfDay::Dusk => self.dusk_multiplier,
            TimeOfDay::Night => self.night_multiplier,
        }
    }

    pub fn weather_penalty(&self, weather: Weather) -> f32 {
        match weather {
            Weather::Clear => 0.0,
            Weather::Rain => self.rain_penalty,
            Weather::Fog => self.fog_penalty,
        }
    }
}

/// Classifier confidence for a clear, close, daylight sighting.
pub fn base_confidence(class: TargetClass) -> f32 {
    match class {
        TargetClass::Building => 0.9,
        TargetClass::Vehicle => 0.88,
        TargetClass::Emergency => 0.92,
        TargetClass::Pedestrian => 0.82,
        TargetClass::Animal => 0.7,
        TargetClass::Ball => 0.6,
        TargetClass::Cone | TargetClass::Barrier => 0.75,
        TargetClass::Pole => 0.65,
        TargetClass::Sign | TargetClass::TrafficLight => 0.8,
    }
}

/// Normalised viewport box; `(x, y)` is the centre, `y` grows downward.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub class: TargetClass,
    pub confidence: f32,
    pub distance: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionReading {
    /// Detections per view id, far to near.
    pub views: BTreeMap<String, Vec<Detection>>,
}

/// Per-tick lighting and weather inputs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Conditions {
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
}

struct Camera {
    eye: Vec3,
    heading: f32,
    half_fov: f32,
    tan_h: f32,
    tan_v: f32,
}

impl Camera {
    fn for_view(pose: &VehiclePose, view: &ViewConfig, height: f32) -> Option<Self> {
        let half_fov = (view.fov_deg * 0.5).to_radians();
        let tan_h = half_fov.tan();
        if !(tan_h.is_finite() && tan_h > 1e-6 && view.aspect > 0.0) {
            return None;
        }
        Some(Self {
            eye: pose.position + Vec3::Y * height,
            heading: pose.heading + view.heading_offset,
            half_fov,
            tan_h,
            tan_v: tan_h / view.aspect,
        })
    }

    /// Camera-space `(right, up, forward)` of a world point.
    fn to_local(&self, p: Vec3) -> Vec3 {
        let d = p - self.eye;
        let (sin, cos) = self.heading.sin_cos();
        Vec3::new(d.x * cos - d.z * sin, d.y, d.x * sin + d.z * cos)
    }
}

/// Run every configured view over the frame's targets.
pub fn tick<R: Rng + ?Sized>(
    pose: &VehiclePose,
    frame: &FrameTargets<'_>,
    conditions: Conditions,
    occluders: &[Aabb],
    config: &VisionConfig,
    rng: &mut R,
) -> VisionReading {
    let candidates = frame.query_range(pose.ground(), config.max_range);
    let jitter =
        (config.jitter > 0.0).then(|| Uniform::new_inclusive(-config.jitter, config.jitter));

    let mut views = BTreeMap::new();
    for view in &config.views {
        let mut detections = Vec::new();
        if let Some(camera) = Camera::for_view(pose, view, config.camera_height) {
            for t in &candidates {
                let Some(mut det) = project(pose, &camera, t, occluders, config) else {
                    continue;
                };
                let noise = jitter.as_ref().map_or(0.0, |u| u.sample(rng));
                let Some(confidence) = score(t.class, det.distance, noise, conditions, config)
                else {
                    continue;
                };
                det.confidence = confidence;
                detections.push(det);
            }
        }
        // Stable, so equal-distance detections keep index order.
        detections.sort_by(|a: &Detection, b: &Detection| b.distance.total_cmp(&a.distance));
        trace!(view = %view.id, detections = detections.len(), "vision view");
        views.insert(view.id.clone(), detections);
    }

    VisionReading { views }
}

/// Geometry half of detection: range, FOV, occlusion and projection.
/// Returns the detection with confidence still unset.
fn project(
    pose: &VehiclePose,
    camera: &Camera,
    t: &Target,
    occluders: &[Aabb],
    config: &VisionConfig,
) -> Option<Detection> {
    let distance = ground_distance(pose.position, t.position);
    if distance > config.max_range {
        return None;
    }
    if bearing(pose.position, camera.heading, t.position).abs() > camera.half_fov {
        return None;
    }
    if !t.class.is_occluder() && !line_of_sight(pose.ground(), t.ground(), occluders) {
        return None;
    }

    let centre = t.position + Vec3::Y * (t.bounds.height * 0.5);
    let local = camera.to_local(centre);
    if local.z <= config.near_epsilon {
        return None;
    }

    let ndc_x = local.x / (local.z * camera.tan_h);
    let ndc_y = local.y / (local.z * camera.tan_v);
    let range = distance.max(config.near_epsilon);
    let extent = t.bounds.half_width.max(t.bounds.half_depth);

    Some(Detection {
        x: (0.5 + 0.5 * ndc_x).clamp(0.0, 1.0),
        y: (0.5 - 0.5 * ndc_y).clamp(0.0, 1.0),
        w: (extent / (range * camera.tan_h)).min(config.max_box_fraction),
        h: (t.bounds.height * 0.5 / (range * camera.tan_v)).min(config.max_box_fraction),
        class: t.class,
        confidence: 0.0,
        distance,
    })
}

/// Confidence model. `None` when the detection falls under the threshold.
fn score(
    class: TargetClass,
    distance: f32,
    noise: f32,
    conditions: Conditions,
    config: &VisionConfig,
) -> Option<f32> {
    let mut c = base_confidence(class) + noise;
    c *= config.time_of_day_multiplier(conditions.time_of_day);
    c -= config.weather_penalty(conditions.weather);
    c *= 1.0 - config.distance_attenuation * (distance / config.max_range).min(1.0);
    let c = c.clamp(config.min_confidence, config.max_confidence);
    (c >= config.detection_threshold).then_some(c)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::index::{IndexConfig, SpatialIndex};
    use crate::target::{Bounds, ObjectId};

    fn quiet() -> VisionConfig {
        VisionConfig {
            jitter: 0.0,
            ..VisionConfig::default()
        }
    }

    fn car(id: u32, x: f32, z: f32) -> Target {
        Target::new(
            ObjectId::Dynamic(id),
            TargetClass::Vehicle,
            Vec3::new(x, 0.0, z),
            Bounds::new(1.0, 2.2, 1.5),
            60.0,
        )
    }

    fn run(dynamic: &[Target], conditions: Conditions, config: &VisionConfig) -> VisionReading {
        let index = SpatialIndex::build(vec![], &IndexConfig::default()).unwrap();
        let frame = FrameTargets::new(&index, dynamic);
        let mut rng = StdRng::seed_from_u64(11);
        tick(&VehiclePose::default(), &frame, conditions, &[], config, &mut rng)
    }

    #[test]
    fn target_ahead_is_centred_in_front_view_only() {
        let reading = run(&[car(1, 0.0, 20.0)], Conditions::default(), &quiet());
        let front = &reading.views["front"];
        assert_eq!(front.len(), 1);
        assert!((front[0].x - 0.5).abs() < 1e-5);
        assert!(reading.views["rear"].is_empty());
        assert!(reading.views["left"].is_empty());
        assert!(reading.views["right"].is_empty());
        assert_eq!(reading.views.len(), 4);
    }

    #[test]
    fn right_side_target_projects_right_of_centre() {
        let reading = run(&[car(1, 5.0, 20.0)], Conditions::default(), &quiet());
        let det = reading.views["front"][0];
        assert!(det.x > 0.5 && det.x <= 1.0);
        // The centre sits above the ground but below the camera.
        assert!(det.y > 0.5);

        let side = run(&[car(1, 15.0, 0.0)], Conditions::default(), &quiet());
        let det = side.views["right"][0];
        assert!((det.x - 0.5).abs() < 1e-4);
        assert!(side.views["left"].is_empty());
    }

    #[test]
    fn behind_camera_is_not_in_front_view() {
        let reading = run(&[car(1, 0.0, -10.0)], Conditions::default(), &quiet());
        assert!(reading.views["front"].is_empty());
        assert_eq!(reading.views["rear"].len(), 1);
    }

    #[test]
    fn beyond_range_is_excluded() {
        let reading = run(&[car(1, 0.0, 51.0)], Conditions::default(), &quiet());
        assert!(reading.views.values().all(|v| v.is_empty()));
    }

    #[test]
    fn occluded_pedestrian_hidden_building_seen() {
        let building = Target::building(1, Aabb::new(-4.0, 4.0, 10.0, 14.0), 20.0, 22.0);
        let index = SpatialIndex::build(vec![building], &IndexConfig::default()).unwrap();
        let walker = Target::new(
            ObjectId::Dynamic(2),
            TargetClass::Pedestrian,
            Vec3::new(0.0, 0.0, 25.0),
            Bounds::new(0.3, 0.3, 1.8),
            37.0,
        );
        let dynamic = [walker];
        let frame = FrameTargets::new(&index, &dynamic);
        let occluders = index.occluders_within(0.0, 0.0, 50.0);
        let mut rng = StdRng::seed_from_u64(3);
        let reading = tick(
            &VehiclePose::default(),
            &frame,
            Conditions::default(),
            &occluders,
            &quiet(),
            &mut rng,
        );
        let front = &reading.views["front"];
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].class, TargetClass::Building);
    }

    #[test]
    fn darkness_and_weather_lower_confidence() {
        let targets = [car(1, 0.0, 20.0)];
        let day = run(&targets, Conditions::default(), &quiet()).views["front"][0].confidence;
        let dusk = run(
            &targets,
            Conditions {
                time_of_day: TimeOfDay::Dusk,
                weather: Weather::Clear,
            },
            &quiet(),
        )
        .views["front"][0]
            .confidence;
        let foggy = run(
            &targets,
            Conditions {
                time_of_day: TimeOfDay::Daylight,
                weather: Weather::Fog,
            },
            &quiet(),
        )
        .views["front"][0]
            .confidence;
        assert!(dusk < day);
        assert!(foggy < day);

        let expected = 0.88 * (1.0 - 0.4 * 20.0 / 50.0);
        assert!((day - expected).abs() < 1e-5, "day confidence {day}");
    }

    #[test]
    fn low_confidence_detections_are_dropped() {
        let night_fog = Conditions {
            time_of_day: TimeOfDay::Night,
            weather: Weather::Fog,
        };
        // 0.88 * 0.25 - 0.2 is close to zero: clamped to the floor, then dropped.
        let reading = run(&[car(1, 0.0, 20.0)], night_fog, &quiet());
        assert!(reading.views["front"].is_empty());
    }

    #[test]
    fn confidence_clamped_to_bounds() {
        let config = VisionConfig {
            jitter: 0.0,
            detection_threshold: 0.0,
            ..VisionConfig::default()
        };
        let night_fog = Conditions {
            time_of_day: TimeOfDay::Night,
            weather: Weather::Fog,
        };
        let reading = run(&[car(1, 0.0, 20.0)], night_fog, &config);
        assert_eq!(reading.views["front"][0].confidence, config.min_confidence);
    }

    #[test]
    fn sorted_far_to_near() {
        let reading = run(
            &[car(1, 0.0, 8.0), car(2, 2.0, 30.0), car(3, -1.0, 15.0)],
            Conditions::default(),
            &quiet(),
        );
        let front = &reading.views["front"];
        assert_eq!(front.len(), 3);
        for pair in front.windows(2) {
            assert!(pair[0].distance >= pair[1].distance);
        }
    }

    #[test]
    fn near_boxes_are_clamped() {
        let reading = run(&[car(1, 0.0, 0.5)], Conditions::default(), &quiet());
        let det = reading.views["front"][0];
        assert!(det.w <= 0.8 && det.h <= 0.8);
        assert_eq!(det.w, 0.8);
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let targets = [car(1, 0.0, 20.0), car(2, 3.0, 12.0)];
        let a = run(&targets, Conditions::default(), &VisionConfig::default());
        let b = run(&targets, Conditions::default(), &VisionConfig::default());
        assert_eq!(a, b);
        let c = a.views["front"][0].confidence;
        let base = 0.88 * (1.0 - 0.4 * 20.0 / 50.0);
        assert!((c - base).abs() <= 0.05 + 1e-5);
    }

    #[test]
    fn degenerate_view_yields_empty_list() {
        let config = VisionConfig {
            views: vec![ViewConfig::new("pinhole", 0.0, 0.0)],
            ..quiet()
        };
        let reading = run(&[car(1, 0.0, 10.0)], Conditions::default(), &config);
        assert!(reading.views["pinhole"].is_empty());
    }
}
