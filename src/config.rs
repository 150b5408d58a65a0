//! Tunable constants for every sensor and for collision.
//!
//! Everything has a gameplay default, so a host can ship `{}` or override a
//! single field (`{"vision": {"maxRange": 80}}`) and keep the rest.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acoustic::AcousticConfig;
use crate::collision::CollisionConfig;
use crate::error::WorldError;
use crate::index::IndexConfig;
use crate::lidar::RangeConfig;
use crate::schedule::SensorSchedule;
use crate::thermal::ThermalConfig;
use crate::vision::VisionConfig;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerceptionConfig {
    pub index: IndexConfig,
    pub range: RangeConfig,
    pub thermal: ThermalConfig,
    pub acoustic: AcousticConfig,
    pub vision: VisionConfig,
    pub collision: CollisionConfig,
    pub schedule: SensorSchedule,
}

impl PerceptionConfig {
    /// Parse a (possibly partial) JSON document and validate the result.
    pub fn from_json(raw: &str) -> Result<Self, WorldError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        debug!(
            cell_stride = config.index.cell_stride,
            views = config.vision.views.len(),
            layers = config.range.vertical_layers(),
            "loaded perception config"
        );
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, WorldError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), WorldError> {
        positive("index.cellStride", self.index.cell_stride)?;

        let r = &self.range;
        positive("range.maxRange", r.max_range)?;
        positive("range.fogFactor", r.fog_factor)?;
        non_negative("range.sweepSpeed", r.sweep_speed)?;
        non_negative("range.rainNoiseMeters", r.rain_noise_meters)?;
        non_negative("range.minDistance", r.min_distance)?;
        if r.layer_tilts_deg.is_empty() {
            return Err(WorldError::InvalidConfig("range.layerTiltsDeg is empty".into()));
        }
        if r.layer_tilts_deg.iter().any(|t| !(t.is_finite() && t.abs() < 90.0)) {
            return Err(WorldError::InvalidConfig(
                "range.layerTiltsDeg must lie strictly between -90 and 90".into(),
            ));
        }
        if r.close_threshold > r.mid_threshold {
            return Err(WorldError::InvalidConfig(
                "range.closeThreshold exceeds range.midThreshold".into(),
            ));
        }

        let t = &self.thermal;
        positive("thermal.range", t.range)?;
        non_negative("thermal.falloffRate", t.falloff_rate)?;
        non_negative("thermal.minFalloff", t.min_falloff)?;

        let a = &self.acoustic;
        positive("acoustic.range", a.range)?;
        non_negative("acoustic.falloffRate", a.falloff_rate)?;
        non_negative("acoustic.baseNoiseFloor", a.base_noise_floor)?;

        let v = &self.vision;
        positive("vision.maxRange", v.max_range)?;
        positive("vision.nearEpsilon", v.near_epsilon)?;
        non_negative("vision.jitter", v.jitter)?;
        if v.min_confidence > v.max_confidence {
            return Err(WorldError::InvalidConfig(
                "vision.minConfidence exceeds vision.maxConfidence".into(),
            ));
        }
        for view in &v.views {
            if view.id.is_empty() {
                return Err(WorldError::InvalidConfig("vision view with empty id".into()));
            }
            if !(view.aspect.is_finite() && view.aspect > 0.0) {
                return Err(WorldError::InvalidConfig(format!(
                    "vision view {} has aspect {}",
                    view.id, view.aspect
                )));
            }
        }

        self.collision.validate()?;
        self.schedule.validate()
    }
}

fn positive(name: &str, value: f32) -> Result<(), WorldError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(WorldError::InvalidConfig(format!("{name} must be positive, got {value}")))
    }
}

fn non_negative(name: &str, value: f32) -> Result<(), WorldError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(WorldError::InvalidConfig(format!("{name} must be >= 0, got {value}")))
    }
}
