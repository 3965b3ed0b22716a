//! Horizon NLP for one MPC solve
//!
//! Decision variables, node-major:
//! - `X`: (N + 1) x 6 states
//! - `U`: N x 3 controls
//! - `T`: N interval durations
//! - `G`: N lateral load transfers
//!
//! Stage `k` owns interval `k`: its collocation rows, the track boundary row
//! of node `k + 1`, its cost, and for `k = 0` the initial condition.

use nlp::{ConstraintSet, DecisionLayout, Nlp, Scalar, VariableBlock, VariableSpec};
use vehicle::collocation::{CollocationConstraintBuilder, IntervalVariables};
use vehicle::dynamics::{control, state};
use vehicle::{Control, DoubleTrackModel, GRAVITY, NU, NX, State};

use crate::config::RacingMpcConfig;
use crate::cost::MinTimeTrackingCost;
use crate::reference::ReferencePath;
use crate::trajectory::HorizonTrajectory;

pub const LABEL_INITIAL_STATE: &str = "initial_state";
pub const LABEL_TRACK_BOUNDARY: &str = "track_boundary";

pub struct RacingMpcProblem<'a> {
    config: &'a RacingMpcConfig,
    reference: &'a ReferencePath,
    builder: CollocationConstraintBuilder<'a>,
    cost: MinTimeTrackingCost,
    initial_state: State,
    layout: DecisionLayout,
    x: VariableBlock,
    u: VariableBlock,
    t: VariableBlock,
    gamma: VariableBlock,
    supports: Vec<Vec<usize>>,
}

impl<'a> RacingMpcProblem<'a> {
    /// Build the problem for one solve. `initial_state` must already lie
    /// within the speed bounds.
    pub fn new(
        model: &'a DoubleTrackModel,
        config: &'a RacingMpcConfig,
        reference: &'a ReferencePath,
        initial_state: State,
    ) -> Self {
        let n = config.horizon;
        let limits = model.config();
        let gamma_max = model.mass() * GRAVITY;

        let mut layout = DecisionLayout::new();
        let state_specs = (0..=n).flat_map(|_| {
            (0..NX).map(move |j| {
                if j == state::SPEED {
                    VariableSpec::new(config.min_speed, config.max_speed, config.scale_x[j])
                } else {
                    VariableSpec::free(config.scale_x[j])
                }
            })
        });
        let x = layout.declare("x", state_specs);
        let control_specs = (0..n).flat_map(|_| {
            [
                VariableSpec::new(0.0, limits.powertrain.max_drive_force, config.scale_u[control::DRIVE]),
                VariableSpec::new(-limits.brake.max_brake_force, 0.0, config.scale_u[control::BRAKE]),
                VariableSpec::new(
                    -limits.steering.max_steer,
                    limits.steering.max_steer,
                    config.scale_u[control::STEER],
                ),
            ]
        });
        let u = layout.declare("u", control_specs);
        let t = layout.declare(
            "t",
            vec![VariableSpec::new(config.t_min, config.t_max, config.scale_t); n],
        );
        let gamma = layout.declare(
            "gamma_y",
            vec![VariableSpec::new(-gamma_max, gamma_max, config.scale_gamma_y); n],
        );
        for j in 0..NX {
            let index = x.index(j);
            layout.set_bounds(index, initial_state[j], initial_state[j]);
        }

        let supports = (0..n)
            .map(|k| {
                let mut support: Vec<usize> = (k * NX..(k + 2) * NX).map(|i| x.index(i)).collect();
                let last_control = if k + 1 < n { k + 2 } else { k + 1 };
                support.extend((k * NU..last_control * NU).map(|i| u.index(i)));
                support.push(t.index(k));
                support.push(gamma.index(k));
                support
            })
            .collect();

        let builder = CollocationConstraintBuilder::new(model)
            .with_state_scale(config.scale_x)
            .with_load_transfer_scale(config.scale_gamma_y);

        log::debug!(
            "racing mpc problem: horizon {}, {} variables",
            n,
            layout.len()
        );

        RacingMpcProblem {
            config,
            reference,
            builder,
            cost: MinTimeTrackingCost::new(config),
            initial_state,
            layout,
            x,
            u,
            t,
            gamma,
            supports,
        }
    }

    fn node_state<T: Scalar>(&self, z: &[T], k: usize) -> [T; NX] {
        std::array::from_fn(|j| z[self.x.index(k * NX + j)])
    }

    fn node_control<T: Scalar>(&self, z: &[T], k: usize) -> [T; NU] {
        std::array::from_fn(|j| z[self.u.index(k * NU + j)])
    }

    /// Flatten a trajectory into a decision vector. Node 0 is replaced by
    /// the pinned initial state.
    pub fn pack(&self, trajectory: &HorizonTrajectory) -> Vec<f64> {
        let mut z = vec![0.0; self.layout.len()];
        for (k, xk) in trajectory.states.iter().enumerate() {
            for j in 0..NX {
                z[self.x.index(k * NX + j)] = xk[j];
            }
        }
        for j in 0..NX {
            z[self.x.index(j)] = self.initial_state[j];
        }
        for (k, uk) in trajectory.controls.iter().enumerate() {
            for j in 0..NU {
                z[self.u.index(k * NU + j)] = uk[j];
            }
        }
        for (k, &tk) in trajectory.step_times.iter().enumerate() {
            z[self.t.index(k)] = tk;
        }
        for (k, &gk) in trajectory.load_transfer.iter().enumerate() {
            z[self.gamma.index(k)] = gk;
        }
        z
    }

    pub fn unpack(&self, z: &[f64]) -> HorizonTrajectory {
        let n = self.config.horizon;
        HorizonTrajectory {
            states: (0..=n).map(|k| State::from(self.node_state(z, k))).collect(),
            controls: (0..n).map(|k| Control::from(self.node_control(z, k))).collect(),
            step_times: self.t.range().map(|i| z[i]).collect(),
            load_transfer: self.gamma.range().map(|i| z[i]).collect(),
        }
    }
}

impl Nlp for RacingMpcProblem<'_> {
    fn layout(&self) -> &DecisionLayout {
        &self.layout
    }

    fn num_stages(&self) -> usize {
        self.config.horizon
    }

    fn stage_support(&self, k: usize) -> &[usize] {
        &self.supports[k]
    }

    fn stage<T: Scalar>(&self, k: usize, z: &[T], constraints: &mut ConstraintSet<T>) -> T {
        let n = self.config.horizon;
        let x = self.node_state(z, k);
        let x_next = self.node_state(z, k + 1);
        let u = self.node_control(z, k);
        let u_next = (k + 1 < n).then(|| self.node_control(z, k + 1));
        let dt = z[self.t.index(k)];

        if k == 0 {
            for j in 0..NX {
                constraints.equal(
                    LABEL_INITIAL_STATE,
                    (x[j] - self.initial_state[j]) / self.config.scale_x[j],
                    0.0,
                );
            }
        }

        let interval = IntervalVariables {
            x,
            u,
            gamma_y: z[self.gamma.index(k)],
            x_next,
            u_next,
            dt,
        };
        self.builder.add_constraints(&interval, constraints);

        let reference = &self.reference.points[k + 1];
        let (contour, _) = reference.errors(x_next[state::X], x_next[state::Y]);
        constraints.bounded(LABEL_TRACK_BOUNDARY, -1.0, contour / reference.half_width, 1.0);

        self.cost
            .interval(reference, &x_next, &u, u_next.as_ref(), dt)
    }
}
