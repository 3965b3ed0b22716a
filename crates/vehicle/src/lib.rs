//! Double-track vehicle model for racing trajectory optimisation.

pub mod collocation;
pub mod config;
pub mod dynamics;
pub mod integrators;
pub mod tyre;

pub use collocation::{CollocationConstraintBuilder, IntervalVariables, align_yaw, hermite_simpson_residual};
pub use config::{
    AeroConfig, BrakeConfig, ChassisConfig, ConfigError, PowertrainConfig, SteeringConfig,
    VehicleConfig,
};
pub use dynamics::{
    Control, DoubleTrackModel, DynamicsOutput, ForwardDynamics, GRAVITY, ModelError, NU, NX, State,
};
pub use integrators::{FixedStepIntegrator, Integrator, RungeKutta4};
pub use tyre::PacejkaTyre;
