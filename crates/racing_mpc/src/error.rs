use nlp::SolverStats;
use thiserror::Error;
use vehicle::{ConfigError, ModelError};

use crate::trajectory::HorizonTrajectory;

/// Why the solver gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NotConverged,
    NonFinite,
    OutOfTime,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FailureReason::NotConverged => "not converged within the iteration budget",
            FailureReason::NonFinite => "non-finite value in the problem",
            FailureReason::OutOfTime => "time budget exhausted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum MpcError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("vehicle model: {0}")]
    Model(#[from] ModelError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{what} has {got} entries, horizon needs {expected}")]
    HorizonMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Recoverable: `last_iterate` can seed the next cycle.
    #[error("solve failed: {reason}")]
    SolveFailure {
        reason: FailureReason,
        last_iterate: Box<HorizonTrajectory>,
        stats: SolverStats,
    },
}
