use thiserror::Error;

use crate::SolverStats;

/// Failure modes of an NLP solve.
///
/// Every variant raised after iterations started carries the last iterate in
/// physical units so callers can reuse it as a warm start.
#[derive(Debug, Error)]
pub enum NlpError {
    #[error("initial guess has {got} entries, problem has {expected} variables")]
    DimensionMismatch { expected: usize, got: usize },

    #[error(
        "not converged after {} outer iterations (violation {:.3e})",
        .stats.outer_iterations,
        .stats.constraint_violation
    )]
    NotConverged {
        last_iterate: Vec<f64>,
        stats: SolverStats,
    },

    #[error("non-finite value encountered after {} outer iterations", .stats.outer_iterations)]
    NonFinite {
        last_iterate: Vec<f64>,
        stats: SolverStats,
    },

    #[error("time budget exhausted after {} outer iterations", .stats.outer_iterations)]
    OutOfTime {
        last_iterate: Vec<f64>,
        stats: SolverStats,
    },
}

impl NlpError {
    pub fn last_iterate(&self) -> Option<&[f64]> {
        match self {
            NlpError::DimensionMismatch { .. } => None,
            NlpError::NotConverged { last_iterate, .. }
            | NlpError::NonFinite { last_iterate, .. }
            | NlpError::OutOfTime { last_iterate, .. } => Some(last_iterate),
        }
    }

    pub fn stats(&self) -> SolverStats {
        match self {
            NlpError::DimensionMismatch { .. } => SolverStats::default(),
            NlpError::NotConverged { stats, .. }
            | NlpError::NonFinite { stats, .. }
            | NlpError::OutOfTime { stats, .. } => *stats,
        }
    }
}
