//! Vehicle configuration
//!
//! Physical constants of the car. Loaded by surrounding code (parameter
//! files) and validated once when a model is built.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tyre::{FRONT_TYRE_FIELDS, PacejkaTyre, REAR_TYRE_FIELDS};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("{field} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Chassis geometry and mass properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    /// Total mass in kg
    pub total_mass: f64,
    /// Moment of inertia about the vertical axis in kg*m^2
    pub moi: f64,
    /// Wheelbase in m
    pub wheel_base: f64,
    /// Fraction of the wheelbase from the CG to the front axle
    pub cg_ratio: f64,
    /// Front track width in m
    pub tw_f: f64,
    /// Rear track width in m
    pub tw_r: f64,
    /// CG height above ground in m
    pub cg_height: f64,
    /// Rolling resistance coefficient
    pub fr: f64,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        ChassisConfig {
            total_mass: 787.0,
            moi: 1000.0,
            wheel_base: 2.9718,
            cg_ratio: 0.5,
            tw_f: 1.6,
            tw_r: 1.5,
            cg_height: 0.275,
            fr: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AeroConfig {
    /// Downforce coefficient at the front axle
    pub cl_f: f64,
    /// Downforce coefficient at the rear axle
    pub cl_r: f64,
    /// Air density in kg/m^3
    pub air_density: f64,
    /// Frontal area in m^2
    pub frontal_area: f64,
    pub drag_coeff: f64,
}

impl Default for AeroConfig {
    fn default() -> Self {
        AeroConfig {
            cl_f: 0.65,
            cl_r: 1.18,
            air_density: 1.2,
            frontal_area: 1.0,
            drag_coeff: 0.8581,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowertrainConfig {
    /// Fraction of drive force delivered to the front axle
    pub kd: f64,
    /// Maximum drive force in N
    pub max_drive_force: f64,
    /// Maximum tractive power in W
    pub max_power: f64,
    /// Time to go from zero to full drive force in s
    pub drive_time_constant: f64,
}

impl Default for PowertrainConfig {
    fn default() -> Self {
        PowertrainConfig {
            kd: 0.0, // rear wheel drive
            max_drive_force: 7100.0,
            max_power: 270_000.0,
            drive_time_constant: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrakeConfig {
    /// Fraction of brake force applied at the front axle
    pub bias: f64,
    /// Maximum brake force magnitude in N (brake inputs are negative)
    pub max_brake_force: f64,
    /// Time to go from zero to full brake force in s
    pub brake_time_constant: f64,
}

impl Default for BrakeConfig {
    fn default() -> Self {
        BrakeConfig {
            bias: 0.6,
            max_brake_force: 5600.0,
            brake_time_constant: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Maximum front wheel angle in rad
    pub max_steer: f64,
    /// Maximum front wheel angle rate in rad/s
    pub max_steer_rate: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        SteeringConfig {
            max_steer: 0.2,
            max_steer_rate: 0.4,
        }
    }
}

/// Complete physical description of the car.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub chassis: ChassisConfig,
    pub aero: AeroConfig,
    pub front_tyre: PacejkaTyre,
    pub rear_tyre: PacejkaTyre,
    pub powertrain: PowertrainConfig,
    pub brake: BrakeConfig,
    pub steering: SteeringConfig,
    /// Tyre to track friction coefficient
    pub friction_coefficient: f64,
    /// Fraction of the roll moment carried by the front axle
    pub roll_distribution_front: f64,
    /// Speed floor applied by standalone dynamics evaluation in m/s
    pub min_evaluation_speed: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        VehicleConfig {
            chassis: ChassisConfig::default(),
            aero: AeroConfig::default(),
            front_tyre: PacejkaTyre::new(9.62, 2.59, 1.0, 3000.0, -0.0813),
            rear_tyre: PacejkaTyre::new(8.62, 2.65, 1.0, 3000.0, -0.1263),
            powertrain: PowertrainConfig::default(),
            brake: BrakeConfig::default(),
            steering: SteeringConfig::default(),
            friction_coefficient: 1.0,
            roll_distribution_front: 0.5,
            min_evaluation_speed: 1.0,
        }
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

impl VehicleConfig {
    /// Reject configurations that would produce meaningless physics.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.chassis;
        positive("chassis.total_mass", c.total_mass)?;
        positive("chassis.moi", c.moi)?;
        positive("chassis.wheel_base", c.wheel_base)?;
        in_range("chassis.cg_ratio", c.cg_ratio, 0.0, 1.0)?;
        positive("chassis.tw_f", c.tw_f)?;
        positive("chassis.tw_r", c.tw_r)?;
        in_range("chassis.cg_height", c.cg_height, 0.0, f64::MAX)?;
        in_range("chassis.fr", c.fr, 0.0, 1.0)?;

        let a = &self.aero;
        finite("aero.cl_f", a.cl_f)?;
        finite("aero.cl_r", a.cl_r)?;
        in_range("aero.air_density", a.air_density, 0.0, f64::MAX)?;
        in_range("aero.frontal_area", a.frontal_area, 0.0, f64::MAX)?;
        in_range("aero.drag_coeff", a.drag_coeff, 0.0, f64::MAX)?;

        self.front_tyre.validate(&FRONT_TYRE_FIELDS)?;
        self.rear_tyre.validate(&REAR_TYRE_FIELDS)?;

        let p = &self.powertrain;
        in_range("powertrain.kd", p.kd, 0.0, 1.0)?;
        positive("powertrain.max_drive_force", p.max_drive_force)?;
        positive("powertrain.max_power", p.max_power)?;
        positive("powertrain.drive_time_constant", p.drive_time_constant)?;

        let b = &self.brake;
        in_range("brake.bias", b.bias, 0.0, 1.0)?;
        positive("brake.max_brake_force", b.max_brake_force)?;
        positive("brake.brake_time_constant", b.brake_time_constant)?;

        positive("steering.max_steer", self.steering.max_steer)?;
        positive("steering.max_steer_rate", self.steering.max_steer_rate)?;

        positive("friction_coefficient", self.friction_coefficient)?;
        in_range("roll_distribution_front", self.roll_distribution_front, 0.0, 1.0)?;
        positive("min_evaluation_speed", self.min_evaluation_speed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(VehicleConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_negative_drive_force_rejected() {
        let mut config = VehicleConfig::default();
        config.powertrain.max_drive_force = -100.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "powertrain.max_drive_force",
                value: -100.0
            })
        );
    }

    #[test]
    fn test_zero_mass_and_wheelbase_rejected() {
        let mut config = VehicleConfig::default();
        config.chassis.total_mass = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { field: "chassis.total_mass", .. })
        ));

        let mut config = VehicleConfig::default();
        config.chassis.wheel_base = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { field: "chassis.wheel_base", .. })
        ));
    }

    #[test]
    fn test_nan_rejected() {
        let mut config = VehicleConfig::default();
        config.chassis.moi = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotFinite { field: "chassis.moi", .. })
        ));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: VehicleConfig =
            serde_json::from_str(r#"{ "chassis": { "total_mass": 650.0 } }"#).unwrap();
        assert_eq!(config.chassis.total_mass, 650.0);
        assert_eq!(config.chassis.moi, ChassisConfig::default().moi);
        assert_eq!(config.friction_coefficient, 1.0);
    }
}
