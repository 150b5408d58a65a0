//! Decimated sensor cadence.
//!
//! Sensors are expensive relative to a physics step, so the host fires each
//! one on a subset of frames. Phases stagger them so their costs don't pile up
//! on the same frame. This is advice for the host: every tick stays valid on
//! any frame.

use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// Fire on frames where `frame % every == phase % every`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cadence {
    pub every: u32,
    pub phase: u32,
}

impl Cadence {
    pub const fn new(every: u32, phase: u32) -> Self {
        Self { every, phase }
    }

    pub fn fires_on(&self, frame: u64) -> bool {
        if self.every == 0 {
            return false;
        }
        let every = u64::from(self.every);
        frame % every == u64::from(self.phase) % every
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SensorSchedule {
    pub range: Cadence,
    pub thermal: Cadence,
    pub acoustic: Cadence,
    pub vision: Cadence,
}

impl Default for SensorSchedule {
    fn default() -> Self {
        Self {
            range: Cadence::new(2, 0),
            thermal: Cadence::new(4, 1),
            acoustic: Cadence::new(3, 2),
            vision: Cadence::new(3, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueSensors {
    pub range: bool,
    pub thermal: bool,
    pub acoustic: bool,
    pub vision: bool,
}

impl DueSensors {
    pub fn any(&self) -> bool {
        self.range || self.thermal || self.acoustic || self.vision
    }
}

impl SensorSchedule {
    pub fn due(&self, frame: u64) -> DueSensors {
        DueSensors {
            range: self.range.fires_on(frame),
            thermal: self.thermal.fires_on(frame),
            acoustic: self.acoustic.fires_on(frame),
            vision: self.vision.fires_on(frame),
        }
    }

    pub fn validate(&self) -> Result<(), WorldError> {
        let cadences = [
            ("range", self.range),
            ("thermal", self.thermal),
            ("acoustic", self.acoustic),
            ("vision", self.vision),
        ];
        for (name, cadence) in cadences {
            if cadence.every == 0 {
                return Err(WorldError::InvalidConfig(format!(
                    "{name} cadence period must be > 0"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadence_matches_decimation() {
        let schedule = SensorSchedule::default();
        let frames: Vec<DueSensors> = (0..12).map(|f| schedule.due(f)).collect();
        assert_eq!(frames.iter().filter(|d| d.range).count(), 6);
        assert_eq!(frames.iter().filter(|d| d.thermal).count(), 3);
        assert_eq!(frames.iter().filter(|d| d.acoustic).count(), 4);
        assert_eq!(frames.iter().filter(|d| d.vision).count(), 4);

        assert!(frames[0].range && frames[0].vision && !frames[0].thermal);
        assert!(frames[1].thermal && !frames[1].range);
        assert!(frames[2].acoustic && frames[2].range);
    }

    #[test]
    fn phase_wraps_modulo_period() {
        let c = Cadence::new(3, 7);
        assert!(c.fires_on(1));
        assert!(c.fires_on(4));
        assert!(!c.fires_on(0));
    }

    #[test]
    fn zero_period_never_fires_and_fails_validation() {
        let c = Cadence::new(0, 0);
        assert!(!c.fires_on(0));
        let schedule = SensorSchedule {
            vision: c,
            ..SensorSchedule::default()
        };
        assert!(matches!(schedule.validate(), Err(WorldError::InvalidConfig(_))));
        assert!(SensorSchedule::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let schedule: SensorSchedule =
            serde_json::from_str(r#"{ "vision": { "every": 1, "phase": 0 } }"#).unwrap();
        assert_eq!(schedule.vision, Cadence::new(1, 0));
        assert_eq!(schedule.range, Cadence::new(2, 0));
        assert!((0..5).all(|f| schedule.due(f).any()));
    }
}
