use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Vehicle pose as owned by the physics collaborator.
///
/// Heading `0` faces world `+Z`; positive heading turns toward `+X`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePose {
    pub position: Vec3,
    /// Radians.
    pub heading: f32,
    /// Metres per second.
    pub speed: f32,
}

impl VehiclePose {
    pub fn new(position: Vec3, heading: f32, speed: f32) -> Self {
        Self {
            position,
            heading,
            speed,
        }
    }

    pub fn ground(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }

    /// Unit forward vector on the ground plane.
    pub fn forward(&self) -> Vec2 {
        Vec2::new(self.heading.sin(), self.heading.cos())
    }

    /// Unit right vector on the ground plane.
    pub fn right(&self) -> Vec2 {
        Vec2::new(self.heading.cos(), -self.heading.sin())
    }
}

impl Default for VehiclePose {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 0.0, 0.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Fog,
}

impl std::str::FromStr for Weather {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clear" => Ok(Weather::Clear),
            "rain" => Ok(Weather::Rain),
            "fog" => Ok(Weather::Fog),
            other => Err(format!("unknown weather '{other}'")),
        }
    }
}

/// Lighting band used by the vision confidence model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    #[default]
    Daylight,
    Dusk,
    Night,
}

impl TimeOfDay {
    /// Classify a clock hour in `[0, 24)`. Values outside wrap around.
    pub fn from_hour(hour: f32) -> Self {
        let h = if hour.is_finite() { hour.rem_euclid(24.0) } else { 12.0 };
        if (7.0..18.0).contains(&h) {
            TimeOfDay::Daylight
        } else if (5.0..7.0).contains(&h) || (18.0..20.0).contains(&h) {
            TimeOfDay::Dusk
        } else {
            TimeOfDay::Night
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_right_at_heading_zero() {
        let pose = VehiclePose::default();
        assert!((pose.forward() - Vec2::new(0.0, 1.0)).length() < 1e-6);
        assert!((pose.right() - Vec2::new(1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn forward_is_perpendicular_to_right() {
        for i in 0..12 {
            let pose = VehiclePose::new(Vec3::ZERO, i as f32 * 0.53, 0.0);
            assert!(pose.forward().dot(pose.right()).abs() < 1e-6);
        }
    }

    #[test]
    fn time_of_day_bands() {
        assert_eq!(TimeOfDay::from_hour(12.0), TimeOfDay::Daylight);
        assert_eq!(TimeOfDay::from_hour(6.0), TimeOfDay::Dusk);
        assert_eq!(TimeOfDay::from_hour(19.5), TimeOfDay::Dusk);
        assert_eq!(TimeOfDay::from_hour(23.0), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(2.0), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(36.0), TimeOfDay::Daylight);
    }

    #[test]
    fn weather_parses() {
        assert_eq!("Rain".parse::<Weather>(), Ok(Weather::Rain));
        assert_eq!("fog".parse::<Weather>(), Ok(Weather::Fog));
        assert!("snow".parse::<Weather>().is_err());
    }
}
