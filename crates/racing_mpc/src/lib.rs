//! Minimum-time racing model predictive control
//!
//! Each cycle builds a Hermite-Simpson collocation NLP over the horizon from
//! the measured state and a reference path, hands it to an [`nlp::NlpSolver`],
//! and returns the optimised trajectory. [`RacingMpc::create_warm_start`]
//! seeds the first cycle and any cycle after a failure.

pub mod config;
pub mod cost;
pub mod error;
pub mod formulation;
pub mod mpc;
pub mod reference;
pub mod trajectory;

pub use config::RacingMpcConfig;
pub use cost::MinTimeTrackingCost;
pub use error::{FailureReason, MpcError};
pub use formulation::RacingMpcProblem;
pub use mpc::{RacingMpc, SolveInput, SolveOutput, WarmStartInput, max_collocation_defect};
pub use reference::{ReferencePath, ReferencePoint};
pub use trajectory::HorizonTrajectory;
