//! Nonlinear programming layer
//!
//! This crate provides:
//! - A [`Scalar`] trait so expressions can be evaluated or differentiated
//! - Decision-variable layout and constraint collection
//! - The [`Nlp`] / [`NlpSolver`] seams and an augmented Lagrangian backend

pub mod alm;
pub mod constraint;
pub mod error;
pub mod problem;
pub mod scalar;

pub use alm::{AlmSettings, AlmSolver};
pub use constraint::{ConstraintRow, ConstraintSet};
pub use error::NlpError;
pub use problem::{DecisionLayout, Nlp, VariableBlock, VariableSpec};
pub use scalar::{Scalar, derivative, seed};

pub use num_dual::Dual64;

/// Iteration counters and final measures of a solve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    pub outer_iterations: usize,
    pub inner_iterations: usize,
    pub constraint_violation: f64,
    pub penalty: f64,
    pub cost: f64,
}

/// A converged solution in physical units.
#[derive(Debug, Clone)]
pub struct NlpSolution {
    pub z: Vec<f64>,
    /// Lagrange multipliers, one per constraint row
    pub multipliers: Vec<f64>,
    pub stats: SolverStats,
}

/// External nonlinear solver.
pub trait NlpSolver {
    fn solve<P: Nlp>(&self, problem: &P, initial_guess: &[f64]) -> Result<NlpSolution, NlpError>;
}
