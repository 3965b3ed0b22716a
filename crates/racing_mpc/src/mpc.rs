use std::sync::Arc;

use log::{debug, info, warn};
use nlp::{NlpError, NlpSolver, SolverStats};
use vehicle::dynamics::{control, state};
use vehicle::{
    Control, DoubleTrackModel, FixedStepIntegrator, NX, RungeKutta4, State, VehicleConfig,
};

use crate::config::RacingMpcConfig;
use crate::error::{FailureReason, MpcError};
use crate::formulation::RacingMpcProblem;
use crate::reference::ReferencePath;
use crate::trajectory::HorizonTrajectory;

#[derive(Debug, Clone)]
pub struct SolveInput {
    /// Measured current state
    pub state: State,
    pub reference: ReferencePath,
    /// Initial guess, usually the shifted previous solution
    pub warm_start: HorizonTrajectory,
}

#[derive(Debug, Clone)]
pub struct SolveOutput {
    pub trajectory: HorizonTrajectory,
    pub cost: f64,
    pub stats: SolverStats,
}

#[derive(Debug, Clone)]
pub struct WarmStartInput {
    pub state: State,
    pub reference: ReferencePath,
}

/// Minimum-time racing MPC over a shared vehicle model.
///
/// One instance serves every control cycle; solves must not overlap.
pub struct RacingMpc<S: NlpSolver> {
    config: RacingMpcConfig,
    model: Arc<DoubleTrackModel>,
    solver: S,
}

impl<S: NlpSolver> RacingMpc<S> {
    pub fn new(config: RacingMpcConfig, model: Arc<DoubleTrackModel>, solver: S) -> Result<Self, MpcError> {
        config.validate()?;
        debug!(
            "racing mpc: horizon {}, t in [{}, {}] s",
            config.horizon, config.t_min, config.t_max
        );
        Ok(RacingMpc {
            config,
            model,
            solver,
        })
    }

    /// Validate both configurations and build the model.
    pub fn from_configs(vehicle: VehicleConfig, config: RacingMpcConfig, solver: S) -> Result<Self, MpcError> {
        let model = Arc::new(DoubleTrackModel::new(vehicle)?);
        Self::new(config, model, solver)
    }

    pub fn config(&self) -> &RacingMpcConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<DoubleTrackModel> {
        &self.model
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    fn check_state(&self, x: &State) -> Result<(), MpcError> {
        if x.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(MpcError::InvalidInput(format!("non-finite state {:?}", x.as_slice())))
        }
    }

    /// The measured state with its speed clamped into the admissible band.
    fn pinned_state(&self, x: &State) -> State {
        let mut pinned = *x;
        let v = x[state::SPEED];
        let clamped = v.clamp(self.config.min_speed, self.config.max_speed);
        if clamped != v {
            warn!("initial speed {v:.3} m/s outside [{}, {}], clamped", self.config.min_speed, self.config.max_speed);
            pinned[state::SPEED] = clamped;
        }
        pinned
    }

    /// Solve the horizon problem from the measured state.
    pub fn solve(&self, input: &SolveInput) -> Result<SolveOutput, MpcError> {
        let n = self.config.horizon;
        self.check_state(&input.state)?;
        input.reference.validate(n)?;
        input.warm_start.validate(n)?;

        let x0 = self.pinned_state(&input.state);
        let problem = RacingMpcProblem::new(&self.model, &self.config, &input.reference, x0);
        let guess = problem.pack(&input.warm_start);

        match self.solver.solve(&problem, &guess) {
            Ok(solution) => {
                let trajectory = problem.unpack(&solution.z);
                info!(
                    "racing mpc: solved, horizon time {:.3} s, cost {:.4}",
                    trajectory.total_time(),
                    solution.stats.cost
                );
                Ok(SolveOutput {
                    trajectory,
                    cost: solution.stats.cost,
                    stats: solution.stats,
                })
            }
            Err(NlpError::DimensionMismatch { expected, got }) => Err(MpcError::InvalidInput(format!(
                "solver expected {expected} variables, received {got}"
            ))),
            Err(err) => {
                let reason = match err {
                    NlpError::OutOfTime { .. } => FailureReason::OutOfTime,
                    NlpError::NonFinite { .. } => FailureReason::NonFinite,
                    _ => FailureReason::NotConverged,
                };
                warn!("racing mpc: {err}");
                let last_iterate = match err.last_iterate() {
                    Some(z) if z.len() == guess.len() => problem.unpack(z),
                    _ => problem.unpack(&guess),
                };
                Err(MpcError::SolveFailure {
                    reason,
                    last_iterate: Box::new(last_iterate),
                    stats: err.stats(),
                })
            }
        }
    }

    /// Forward-simulate a path-following policy to seed the first solve.
    ///
    /// Steering follows the kinematic angle of the reference curvature, drive
    /// cancels drag and rolling resistance, and each interval lasts as long as
    /// covering the reference spacing at the current speed.
    pub fn create_warm_start(&self, input: &WarmStartInput) -> Result<HorizonTrajectory, MpcError> {
        let n = self.config.horizon;
        self.check_state(&input.state)?;
        input.reference.validate(n)?;

        let limits = self.model.config();
        let wheel_base = limits.chassis.wheel_base;
        let max_steer = limits.steering.max_steer;
        let integrator = FixedStepIntegrator::new(RungeKutta4, self.config.integration_step);

        let mut trajectory = HorizonTrajectory {
            states: Vec::with_capacity(n + 1),
            controls: Vec::with_capacity(n),
            step_times: Vec::with_capacity(n),
            load_transfer: Vec::with_capacity(n),
        };
        let mut x = input.state;
        trajectory.states.push(x);

        for k in 0..n {
            let v = x[state::SPEED].max(self.config.min_speed);
            let curvature = input.reference.points[k].curvature;
            let drive_limit = limits
                .powertrain
                .max_drive_force
                .min(limits.powertrain.max_power / v);
            let mut u = Control::zeros();
            u[control::DRIVE] = self.model.resistive_force(v).clamp(0.0, drive_limit);
            u[control::STEER] = (wheel_base * curvature).atan().clamp(-max_steer, max_steer);

            let dt = (input.reference.spacing(k) / v).clamp(self.config.t_min, self.config.t_max);
            let gamma_y = self.model.forward_dynamics(&x, &u)?.gamma_y;
            x = integrator.integrate(&x, dt, |s: &State| {
                self.model.forward_dynamics(s, &u).map(|out| out.x_dot)
            })?;
            if x.iter().any(|v| !v.is_finite()) {
                return Err(MpcError::InvalidInput(format!(
                    "warm start diverged at interval {k}"
                )));
            }

            trajectory.controls.push(u);
            trajectory.step_times.push(dt);
            trajectory.load_transfer.push(gamma_y);
            trajectory.states.push(x);
        }

        debug!(
            "racing mpc: warm start over {:.3} s, final speed {:.2} m/s",
            trajectory.total_time(),
            trajectory.states[n][state::SPEED]
        );
        Ok(trajectory)
    }
}

/// Largest scaled collocation defect over a trajectory.
pub fn max_collocation_defect(model: &DoubleTrackModel, config: &RacingMpcConfig, trajectory: &HorizonTrajectory) -> f64 {
    let n = trajectory.horizon();
    (0..n)
        .map(|k| {
            let vars = vehicle::IntervalVariables {
                x: std::array::from_fn(|j| trajectory.states[k][j]),
                u: std::array::from_fn(|j| trajectory.controls[k][j]),
                gamma_y: trajectory.load_transfer[k],
                x_next: std::array::from_fn(|j| trajectory.states[k + 1][j]),
                u_next: None,
                dt: trajectory.step_times[k],
            };
            let defect = vehicle::hermite_simpson_residual(model, &vars);
            (0..NX)
                .map(|j| (defect[j] / config.scale_x[j]).abs())
                .fold(0.0, f64::max)
        })
        .fold(0.0, f64::max)
}
