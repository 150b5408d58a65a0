//! Omnidirectional acoustic sensor.
//!
//! Sound diffracts around buildings, so unlike the thermal and vision sensors
//! there is no line-of-sight test. The only mask is the ambient noise floor.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::environment::{VehiclePose, Weather};
use crate::geometry::{bearing, ground_distance};
use crate::index::FrameTargets;
use crate::target::{FreqBand, TargetClass};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcousticConfig {
    pub range: f32,
    pub falloff_rate: f32,
    pub base_noise_floor: f32,
    /// Extra ambient noise while it rains.
    pub rain_floor_bonus: f32,
}

impl Default for AcousticConfig {
    fn default() -> Self {
        Self {
            range: 80.0,
            falloff_rate: 0.05,
            base_noise_floor: 0.1,
            rain_floor_bonus: 0.15,
        }
    }
}

impl AcousticConfig {
    pub fn noise_floor(&self, weather: Weather) -> f32 {
        match weather {
            Weather::Rain => self.base_noise_floor + self.rain_floor_bonus,
            Weather::Clear | Weather::Fog => self.base_noise_floor,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcousticSource {
    /// Radians in `[-π, π]`; `0` is dead ahead, positive is to the right.
    pub bearing: f32,
    pub distance: f32,
    pub intensity: f32,
    pub freq_band: FreqBand,
    pub label: String,
    pub class: TargetClass,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcousticReading {
    /// Loudest first.
    pub sources: Vec<AcousticSource>,
    pub noise_floor: f32,
}

pub fn tick(
    pose: &VehiclePose,
    frame: &FrameTargets<'_>,
    weather: Weather,
    config: &AcousticConfig,
) -> AcousticReading {
    let noise_floor = config.noise_floor(weather);
    let candidates = frame.query_range(pose.ground(), config.range);

    let mut sources: Vec<AcousticSource> = candidates
        .iter()
        .filter_map(|t| {
            let sound = t.sound_signature?;
            let distance = ground_distance(pose.position, t.position);
            if distance > config.range {
                return None;
            }
            let intensity = sound.intensity / (1.0 + distance * config.falloff_rate);
            if intensity < noise_floor {
                return None;
            }
            Some(AcousticSource {
                bearing: bearing(pose.position, pose.heading, t.position),
                distance,
                intensity,
                freq_band: sound.kind.freq_band(),
                label: sound.kind.label().to_string(),
                class: t.class,
            })
        })
        .collect();

    sources.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));

    trace!(candidates = candidates.len(), sources = sources.len(), noise_floor, "acoustic tick");
    AcousticReading {
        sources,
        noise_floor,
    }
}
