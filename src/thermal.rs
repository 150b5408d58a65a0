use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::environment::{VehiclePose, Weather};
use crate::geometry::{ground_distance, line_of_sight, Aabb};
use crate::index::FrameTargets;
use crate::target::TargetClass;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThermalConfig {
    /// Detection radius, metres.
    pub range: f32,
    /// Fractional signal loss per metre.
    pub falloff_rate: f32,
    /// Lower bound of the distance falloff factor.
    pub min_falloff: f32,
    pub fog_multiplier: f32,
    pub rain_multiplier: f32,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            range: 40.0,
            falloff_rate: 0.015,
            min_falloff: 0.1,
            fog_multiplier: 0.6,
            rain_multiplier: 0.8,
        }
    }
}

impl ThermalConfig {
    pub fn weather_multiplier(&self, weather: Weather) -> f32 {
        match weather {
            Weather::Clear => 1.0,
            Weather::Rain => self.rain_multiplier,
            Weather::Fog => self.fog_multiplier,
        }
    }
}

/// A heat source, positioned relative to the vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermalBlob {
    pub rel_x: f32,
    pub rel_z: f32,
    /// Source temperature, °C.
    pub temp: f32,
    /// Temperature as perceived after distance and weather loss.
    pub display_temp: f32,
    pub radius: f32,
    pub class: TargetClass,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermalReading {
    pub blobs: Vec<ThermalBlob>,
}

/// One thermal frame. Non-building targets hidden behind an occluder are dropped.
pub fn tick(
    pose: &VehiclePose,
    frame: &FrameTargets<'_>,
    weather: Weather,
    occluders: &[Aabb],
    config: &ThermalConfig,
) -> ThermalReading {
    let origin = pose.ground();
    let weather_mult = config.weather_multiplier(weather);
    let candidates = frame.query_range(origin, config.range);

    let blobs: Vec<ThermalBlob> = candidates
        .iter()
        .filter_map(|t| {
            let dist = ground_distance(pose.position, t.position);
            if dist > config.range {
                return None;
            }
            if !t.class.is_occluder() && !line_of_sight(origin, t.ground(), occluders) {
                return None;
            }
            let falloff = (1.0 - dist * config.falloff_rate).max(config.min_falloff);
            Some(ThermalBlob {
                rel_x: t.position.x - pose.position.x,
                rel_z: t.position.z - pose.position.z,
                temp: t.thermal_signature,
                display_temp: t.thermal_signature * falloff * weather_mult,
                radius: t.bounds.half_width.max(t.bounds.half_depth).max(0.5),
                class: t.class,
            })
        })
        .collect();

    trace!(candidates = candidates.len(), blobs = blobs.len(), "thermal tick");
    ThermalReading { blobs }
}
