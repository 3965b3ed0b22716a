//! Control node cycling the racing MPC
//!
//! Cycle states:
//! - `NoPriorSolution` or `Degraded`: seed the solve with a fresh warm start
//! - `Converged`: seed it with the previous solution shifted by one interval
//!
//! A failed solve leaves the node `Degraded` and returns the fallback control.

use log::{debug, warn};
use nlp::NlpSolver;
use racing_mpc::{HorizonTrajectory, MpcError, RacingMpc, ReferencePath, SolveInput, WarmStartInput};
use vehicle::dynamics::control;
use vehicle::{Control, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    NoPriorSolution,
    WarmStarted,
    Converged,
    Degraded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub cycles: usize,
    pub converged: usize,
    pub degraded: usize,
}

pub struct RacingNode<S: NlpSolver> {
    mpc: RacingMpc<S>,
    fallback_brake_force: f64,
    state: NodeState,
    warm_start: Option<HorizonTrajectory>,
    last_control: Control,
    stats: NodeStats,
}

impl<S: NlpSolver> RacingNode<S> {
    /// `fallback_brake_force` is the positive brake force applied while degraded.
    pub fn new(mpc: RacingMpc<S>, fallback_brake_force: f64) -> Self {
        Self {
            mpc,
            fallback_brake_force,
            state: NodeState::NoPriorSolution,
            warm_start: None,
            last_control: Control::zeros(),
            stats: NodeStats::default(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn mpc(&self) -> &RacingMpc<S> {
        &self.mpc
    }

    /// Trajectory that will seed the next solve, if one is carried over.
    pub fn warm_start(&self) -> Option<&HorizonTrajectory> {
        self.warm_start.as_ref()
    }

    /// No drive, fixed braking, steering held at its last command.
    pub fn fallback_control(&self) -> Control {
        let mut u = Control::zeros();
        u[control::BRAKE] = -self.fallback_brake_force;
        u[control::STEER] = self.last_control[control::STEER];
        u
    }

    /// Run one control cycle and return the control to apply.
    ///
    /// Solver failures are absorbed into the `Degraded` state. Malformed
    /// inputs and model errors are returned, with the node left `Degraded`.
    pub fn step(&mut self, x: &State, reference: &ReferencePath) -> Result<Control, MpcError> {
        self.stats.cycles += 1;
        let result = self.cycle(x, reference);
        if result.is_err() {
            self.enter_degraded();
        }
        result
    }

    fn cycle(&mut self, x: &State, reference: &ReferencePath) -> Result<Control, MpcError> {
        let warm_start = match (self.state, self.warm_start.take()) {
            (NodeState::Converged, Some(shifted)) => shifted,
            _ => {
                debug!("racing node: {:?}, creating warm start", self.state);
                self.mpc.create_warm_start(&WarmStartInput {
                    state: *x,
                    reference: reference.clone(),
                })?
            }
        };
        self.state = NodeState::WarmStarted;

        let input = SolveInput {
            state: *x,
            reference: reference.clone(),
            warm_start,
        };
        match self.mpc.solve(&input) {
            Ok(output) => {
                let u = match output.trajectory.first_control() {
                    Some(u) => *u,
                    None => self.fallback_control(),
                };
                self.warm_start = Some(output.trajectory.shifted());
                self.state = NodeState::Converged;
                self.stats.converged += 1;
                self.last_control = u;
                Ok(u)
            }
            Err(MpcError::SolveFailure { reason, stats, .. }) => {
                warn!(
                    "racing node: solve failed ({reason}) after {} outer iterations, applying fallback",
                    stats.outer_iterations
                );
                self.enter_degraded();
                Ok(self.last_control)
            }
            Err(err) => Err(err),
        }
    }

    fn enter_degraded(&mut self) {
        self.last_control = self.fallback_control();
        self.warm_start = None;
        self.state = NodeState::Degraded;
        self.stats.degraded += 1;
    }
}
