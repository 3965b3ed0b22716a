//! Application configuration, loaded from an optional JSON file

use std::f64::consts::FRAC_PI_2;
use std::path::Path;
use std::time::Duration;

use nlp::AlmSettings;
use racing_mpc::{RacingMpcConfig, ReferencePath};
use serde::{Deserialize, Serialize};
use vehicle::dynamics::state;
use vehicle::{ConfigError, State, VehicleConfig};

use crate::error::AppError;

/// Circular test track.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub center: [f64; 2],
    /// Centre line radius in m
    pub radius: f64,
    /// Admissible lateral distance from the centre line in m
    pub half_width: f64,
    pub counter_clockwise: bool,
    /// Reference nodes are spaced by the distance covered in this time, in s
    pub preview_step: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0],
            radius: 80.0,
            half_width: 5.0,
            counter_clockwise: true,
            preview_step: 0.1,
        }
    }
}

impl TrackConfig {
    fn direction(&self) -> f64 {
        if self.counter_clockwise { 1.0 } else { -1.0 }
    }

    /// A state on the centre line heading along +x at `speed`, with the yaw
    /// rate of steady cornering.
    pub fn start_state(&self, speed: f64) -> State {
        let direction = self.direction();
        let angle = -direction * FRAC_PI_2;
        let mut x = State::zeros();
        x[state::X] = self.center[0] + self.radius * angle.cos();
        x[state::Y] = self.center[1] + self.radius * angle.sin();
        x[state::YAW] = 0.0;
        x[state::YAW_RATE] = direction * speed / self.radius;
        x[state::SPEED] = speed;
        x
    }

    /// `count` reference points starting at the centre line point closest
    /// to `x`, spaced by the distance covered at the current speed.
    pub fn reference(&self, x: &State, min_speed: f64, count: usize) -> ReferencePath {
        let angle = (x[state::Y] - self.center[1]).atan2(x[state::X] - self.center[0]);
        let spacing = x[state::SPEED].max(min_speed) * self.preview_step;
        ReferencePath::arc(
            self.center[0],
            self.center[1],
            self.radius,
            angle,
            spacing,
            count,
            self.half_width,
            self.counter_clockwise,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("track.radius", self.radius),
            ("track.half_width", self.half_width),
            ("track.preview_step", self.preview_step),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field, value });
            }
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if self.half_width >= self.radius {
            return Err(ConfigError::OutOfRange {
                field: "track.half_width",
                value: self.half_width,
                min: 0.0,
                max: self.radius,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vehicle: VehicleConfig,
    pub mpc: RacingMpcConfig,
    pub track: TrackConfig,
    /// Number of control cycles to run
    pub cycles: usize,
    /// Time between control updates in s
    pub control_period: f64,
    /// Brake force applied while degraded, in N (positive)
    pub fallback_brake_force: f64,
    pub initial_speed: f64,
    /// Cap every solve at one control period of wall-clock time
    pub realtime: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vehicle: VehicleConfig::default(),
            mpc: RacingMpcConfig::default(),
            track: TrackConfig::default(),
            cycles: 100,
            control_period: 0.05,
            fallback_brake_force: 2000.0,
            initial_speed: 20.0,
            realtime: false,
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        let config: AppConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Solver settings for the closed loop, with the real-time budget applied.
    pub fn solver_settings(&self) -> AlmSettings {
        let settings = self.mpc.solver.clone();
        match Duration::try_from_secs_f64(self.control_period) {
            Ok(budget) if self.realtime => settings.with_max_duration(budget),
            _ => settings,
        }
    }

    /// Checks the application level fields. The vehicle and MPC sections are
    /// validated when the model and controller are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.track.validate()?;
        for (field, value) in [
            ("control_period", self.control_period),
            ("initial_speed", self.initial_speed),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field, value });
            }
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        let max_brake = self.vehicle.brake.max_brake_force;
        if !(0.0..=max_brake).contains(&self.fallback_brake_force) {
            return Err(ConfigError::OutOfRange {
                field: "fallback_brake_force",
                value: self.fallback_brake_force,
                min: 0.0,
                max: max_brake,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.cycles, 100);
        assert_eq!(config.mpc.horizon, RacingMpcConfig::default().horizon);
        assert_eq!(config.track.radius, 80.0);
    }

    #[test]
    fn test_nested_override() {
        let config = AppConfig::from_json(
            r#"{ "cycles": 7, "mpc": { "horizon": 8 }, "track": { "counter_clockwise": false } }"#,
        )
        .unwrap();
        assert_eq!(config.cycles, 7);
        assert_eq!(config.mpc.horizon, 8);
        assert!(!config.track.counter_clockwise);
        assert_eq!(config.track.half_width, 5.0);
    }

    #[test]
    fn test_rejects_excess_fallback_brake() {
        let err = AppConfig::from_json(r#"{ "fallback_brake_force": 1.0e6 }"#).unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::OutOfRange { field: "fallback_brake_force", .. })
        ));
    }

    #[test]
    fn test_realtime_caps_solve_at_control_period() {
        let config = AppConfig::from_json(r#"{ "realtime": true, "control_period": 0.04 }"#).unwrap();
        assert_eq!(config.solver_settings().max_duration_ms, Some(40));

        let config = AppConfig::default();
        assert_eq!(config.solver_settings().max_duration_ms, None);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(AppConfig::from_json("{ cycles: 3"), Err(AppError::Json(_))));
    }

    #[test]
    fn test_start_state_and_reference() {
        let track = TrackConfig::default();
        let x = track.start_state(20.0);
        assert!((x[state::Y] + 80.0).abs() < 1e-9);
        assert!(x[state::X].abs() < 1e-9);
        assert!((x[state::YAW_RATE] - 0.25).abs() < 1e-12);

        let reference = track.reference(&x, 1.0, 5);
        assert_eq!(reference.len(), 5);
        let first = reference.points[0];
        assert!((first.x - x[state::X]).abs() < 1e-9 && (first.y - x[state::Y]).abs() < 1e-9);
        assert!(first.yaw.abs() < 1e-9);
        assert!((reference.spacing(0) - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_clockwise_start_heads_along_x() {
        let track = TrackConfig {
            counter_clockwise: false,
            ..TrackConfig::default()
        };
        let x = track.start_state(10.0);
        let reference = track.reference(&x, 1.0, 3);
        assert!((x[state::Y] - 80.0).abs() < 1e-9);
        assert!(x[state::YAW_RATE] < 0.0);
        assert!(reference.points[0].yaw.abs() < 1e-9);
        assert!(reference.points[1].x > 0.0);
    }
}
