//! Hermite-Simpson collocation constraints for one horizon interval
//!
//! For each interval `i` the builder registers the dynamics defect, the tyre
//! friction ellipses, the load transfer consistency row and the actuator
//! limits on the solver's constraint set. Controls are held over the interval
//! and the load transfer of node `i` is used at both ends and the midpoint.
//! Every row except the pedal exclusivity row is normalised so its magnitude
//! is O(1) near the limit.

use std::f64::consts::TAU;

use nlp::{ConstraintSet, Scalar};

use crate::dynamics::{DoubleTrackModel, DynamicsOutput, GRAVITY, NU, NX, control, state};

pub const LABEL_DYNAMICS: &str = "dynamics";
pub const LABEL_FRICTION: &str = "friction_ellipse";
pub const LABEL_LOAD_TRANSFER: &str = "load_transfer";
pub const LABEL_POWER: &str = "power";
pub const LABEL_MIN_SPEED: &str = "min_speed";
pub const LABEL_DRIVE: &str = "drive_limit";
pub const LABEL_BRAKE: &str = "brake_limit";
pub const LABEL_EXCLUSIVE: &str = "drive_brake_exclusive";
pub const LABEL_STEER: &str = "steer_limit";
pub const LABEL_DRIVE_RATE: &str = "drive_rate";
pub const LABEL_BRAKE_RATE: &str = "brake_rate";
pub const LABEL_STEER_RATE: &str = "steer_rate";

const STATIC_ROWS: usize = NX + 4 + 7;
const RATE_ROWS: usize = 4;

/// Decision variables touching one interval.
#[derive(Debug, Clone, Copy)]
pub struct IntervalVariables<T> {
    pub x: [T; NX],
    pub u: [T; NU],
    pub gamma_y: T,
    pub x_next: [T; NX],
    /// Control of the next node; `None` on the last interval.
    pub u_next: Option<[T; NU]>,
    /// Interval duration in s
    pub dt: T,
}

/// Shift `yaw` by the multiple of 2*pi that brings it closest to `reference`.
///
/// The shift is piecewise constant, so derivatives pass through unchanged.
pub fn align_yaw<T: Scalar>(yaw: T, reference: T) -> T {
    let turns = ((reference.value() - yaw.value()) / TAU).round();
    yaw + turns * TAU
}

/// Registers the per-interval constraints of the racing problem.
#[derive(Debug, Clone)]
pub struct CollocationConstraintBuilder<'a> {
    model: &'a DoubleTrackModel,
    state_scale: [f64; NX],
    load_transfer_scale: f64,
}

impl<'a> CollocationConstraintBuilder<'a> {
    pub fn new(model: &'a DoubleTrackModel) -> Self {
        CollocationConstraintBuilder {
            model,
            state_scale: [1.0; NX],
            load_transfer_scale: model.mass() * GRAVITY,
        }
    }

    pub fn with_state_scale(mut self, scale: [f64; NX]) -> Self {
        self.state_scale = scale;
        self
    }

    pub fn with_load_transfer_scale(mut self, scale: f64) -> Self {
        self.load_transfer_scale = scale;
        self
    }

    pub fn model(&self) -> &DoubleTrackModel {
        self.model
    }

    /// Rows registered per interval.
    pub fn rows_per_interval(has_successor: bool) -> usize {
        if has_successor {
            STATIC_ROWS + RATE_ROWS
        } else {
            STATIC_ROWS
        }
    }

    /// Register all rows of one interval.
    pub fn add_constraints<T: Scalar>(
        &self,
        vars: &IntervalVariables<T>,
        constraints: &mut ConstraintSet<T>,
    ) {
        let config = self.model.config();
        let mu = config.friction_coefficient;
        let fd_max = config.powertrain.max_drive_force;
        let fb_max = config.brake.max_brake_force;
        let delta_max = config.steering.max_steer;

        let (defect, out) = hermite_simpson(self.model, vars);
        for (i, d) in defect.into_iter().enumerate() {
            constraints.equal(LABEL_DYNAMICS, d / self.state_scale[i], 0.0);
        }

        for corner in 0..4 {
            let limit = out.fz[corner] * mu;
            let usage = (out.fx[corner] / limit).powi(2) + (out.fy[corner] / limit).powi(2);
            constraints.at_most(LABEL_FRICTION, usage, 1.0);
        }

        let delta = vars.u[control::STEER];
        let transfer = vars.gamma_y - self.model.lateral_load_transfer(&out, delta);
        constraints.equal(LABEL_LOAD_TRANSFER, transfer / self.load_transfer_scale, 0.0);

        let v = vars.x[state::SPEED];
        let drive = vars.u[control::DRIVE] / fd_max;
        let brake = vars.u[control::BRAKE] / fb_max;
        constraints.at_most(
            LABEL_POWER,
            v * vars.u[control::DRIVE] / config.powertrain.max_power,
            1.0,
        );
        constraints.at_least(LABEL_MIN_SPEED, v, 0.0);
        constraints.bounded(LABEL_DRIVE, 0.0, drive, 1.0);
        constraints.bounded(LABEL_BRAKE, -1.0, brake, 0.0);
        // |F_d * F_b| <= 1 N^2, kept in N^2 so the solver tolerance stays a
        // fraction of that band
        constraints.at_least(LABEL_EXCLUSIVE, vars.u[control::DRIVE] * vars.u[control::BRAKE], -1.0);
        constraints.bounded(LABEL_STEER, -1.0, delta / delta_max, 1.0);

        if let Some(u_next) = vars.u_next {
            let dt = vars.dt;
            let drive_step = (u_next[control::DRIVE] - vars.u[control::DRIVE]) / fd_max;
            let brake_step = (u_next[control::BRAKE] - vars.u[control::BRAKE]) / fb_max;
            let steer_step = (u_next[control::STEER] - delta) / config.steering.max_steer_rate;
            constraints.at_most(
                LABEL_DRIVE_RATE,
                drive_step - dt / config.powertrain.drive_time_constant,
                0.0,
            );
            constraints.at_least(
                LABEL_BRAKE_RATE,
                brake_step + dt / config.brake.brake_time_constant,
                0.0,
            );
            constraints.at_most(LABEL_STEER_RATE, steer_step - dt, 0.0);
            constraints.at_least(LABEL_STEER_RATE, steer_step + dt, 0.0);
        }
    }
}

fn hermite_simpson<T: Scalar>(
    model: &DoubleTrackModel,
    vars: &IntervalVariables<T>,
) -> ([T; NX], DynamicsOutput<T>) {
    let x = &vars.x;
    let mut x_next = vars.x_next;
    x_next[state::YAW] = align_yaw(x_next[state::YAW], x[state::YAW]);
    let dt = vars.dt;

    let out1 = model.state_derivative(x, &vars.u, vars.gamma_y);
    let f1 = out1.x_dot;
    let f2 = model.state_derivative(&x_next, &vars.u, vars.gamma_y).x_dot;
    let xm: [T; NX] =
        std::array::from_fn(|i| (x[i] + x_next[i]) * 0.5 + dt / 8.0 * (f1[i] - f2[i]));
    let fm = model.state_derivative(&xm, &vars.u, vars.gamma_y).x_dot;
    let defect =
        std::array::from_fn(|i| x[i] + dt / 6.0 * (f1[i] + fm[i] * 4.0 + f2[i]) - x_next[i]);
    (defect, out1)
}

/// Unscaled collocation defect of one interval, in state units.
pub fn hermite_simpson_residual<T: Scalar>(
    model: &DoubleTrackModel,
    vars: &IntervalVariables<T>,
) -> [T; NX] {
    hermite_simpson(model, vars).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VehicleConfig;
    use crate::dynamics::{Control, State};
    use crate::integrators::{FixedStepIntegrator, RungeKutta4};
    use nlp::Dual64;
    use std::convert::Infallible;

    fn model() -> DoubleTrackModel {
        DoubleTrackModel::new(VehicleConfig::default()).unwrap()
    }

    fn interval(x: [f64; NX], u: [f64; NU], gamma_y: f64, x_next: [f64; NX], dt: f64) -> IntervalVariables<f64> {
        IntervalVariables {
            x,
            u,
            gamma_y,
            x_next,
            u_next: Some(u),
            dt,
        }
    }

    fn simulate(model: &DoubleTrackModel, x: [f64; NX], u: [f64; NU], gamma_y: f64, dt: f64) -> [f64; NX] {
        let next = FixedStepIntegrator::new(RungeKutta4, dt / 200.0)
            .integrate(&State::from(x), dt, |s: &State| {
                let s: [f64; NX] = std::array::from_fn(|i| s[i]);
                Ok::<_, Infallible>(State::from(model.state_derivative(&s, &u, gamma_y).x_dot))
            })
            .unwrap();
        std::array::from_fn(|i| next[i])
    }

    fn max_abs(values: &[f64]) -> f64 {
        values.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    #[test]
    fn test_residual_vanishes_on_integrated_trajectory() {
        let model = model();
        let x = [0.0, 0.0, 0.2, 0.1, 0.01, 30.0];
        let u = [1000.0, 0.0, 0.03];
        let gamma_y = model
            .forward_dynamics(&State::from(x), &Control::from(u))
            .unwrap()
            .gamma_y;

        let coarse = max_abs(&hermite_simpson_residual(
            &model,
            &interval(x, u, gamma_y, simulate(&model, x, u, gamma_y, 0.1), 0.1),
        ));
        let fine = max_abs(&hermite_simpson_residual(
            &model,
            &interval(x, u, gamma_y, simulate(&model, x, u, gamma_y, 0.05), 0.05),
        ));
        assert!(coarse < 1e-3, "coarse residual {coarse}");
        assert!(fine * 8.0 < coarse, "residual {fine} did not shrink from {coarse}");
    }

    #[test]
    fn test_yaw_wrap_does_not_change_defect() {
        let model = model();
        let x = [0.0, 0.0, 3.1, 0.1, 0.0, 20.0];
        let u = [500.0, 0.0, 0.02];
        let x_next = simulate(&model, x, u, 0.0, 0.1);
        let mut wrapped = x_next;
        wrapped[state::YAW] -= TAU;

        let plain = hermite_simpson_residual(&model, &interval(x, u, 0.0, x_next, 0.1));
        let shifted = hermite_simpson_residual(&model, &interval(x, u, 0.0, wrapped, 0.1));
        for (a, b) in plain.iter().zip(&shifted) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_align_yaw_keeps_derivative() {
        assert!((align_yaw(TAU + 0.1, 0.0) - 0.1).abs() < 1e-12);
        assert!((align_yaw(-3.0, 3.0) - (TAU - 3.0)).abs() < 1e-12);
        let aligned = align_yaw(Dual64::new(2.0 * TAU, 1.0), <Dual64 as Scalar>::constant(0.0));
        assert!(aligned.re.abs() < 1e-12);
        assert_eq!(aligned.eps, 1.0);
    }

    #[test]
    fn test_row_counts() {
        let model = model();
        let builder = CollocationConstraintBuilder::new(&model);
        let x = [0.0, 0.0, 0.0, 0.0, 0.0, 20.0];
        let mut vars = interval(x, [0.0; NU], 0.0, x, 0.1);

        let mut set = ConstraintSet::new();
        builder.add_constraints(&vars, &mut set);
        assert_eq!(set.len(), CollocationConstraintBuilder::rows_per_interval(true));
        assert_eq!(set.len(), 21);
        assert_eq!(set.labelled(LABEL_DYNAMICS).count(), NX);
        assert_eq!(set.labelled(LABEL_FRICTION).count(), 4);
        assert_eq!(set.labelled(LABEL_STEER_RATE).count(), 2);

        vars.u_next = None;
        set.clear();
        builder.add_constraints(&vars, &mut set);
        assert_eq!(set.len(), CollocationConstraintBuilder::rows_per_interval(false));
        assert_eq!(set.labelled(LABEL_DRIVE_RATE).count(), 0);
    }

    #[test]
    fn test_friction_row_matches_tyre_forces() {
        let model = model();
        let builder = CollocationConstraintBuilder::new(&model);
        let x = [0.0, 0.0, 0.0, 0.2, 0.01, 25.0];
        let u = [1500.0, 0.0, 0.06];
        let gamma_y = 300.0;
        let vars = interval(x, u, gamma_y, x, 0.1);

        let mut set = ConstraintSet::new();
        builder.add_constraints(&vars, &mut set);
        let out = model.state_derivative(&x, &u, gamma_y);
        let mu = model.config().friction_coefficient;
        for (corner, row) in set.labelled(LABEL_FRICTION).enumerate() {
            let expected = (out.fx[corner] / (mu * out.fz[corner])).powi(2)
                + (out.fy[corner] / (mu * out.fz[corner])).powi(2);
            assert!((row.expr - expected).abs() < 1e-12, "corner {corner}");
        }
    }

    #[test]
    fn test_simultaneous_pedals_flagged() {
        let model = model();
        let builder = CollocationConstraintBuilder::new(&model);
        let x = [0.0, 0.0, 0.0, 0.0, 0.0, 20.0];
        let exclusive = |u: [f64; NU]| {
            let mut set = ConstraintSet::new();
            builder.add_constraints(&interval(x, u, 0.0, x, 0.1), &mut set);
            let mut rows = set.labelled(LABEL_EXCLUSIVE);
            let violation = rows.next().map(|r| r.violation());
            assert!(rows.next().is_none());
            violation.unwrap()
        };

        // violation is the excess over 1 N^2
        assert!((exclusive([600.0, -600.0, 0.0]) - 359_999.0).abs() < 1e-6);
        assert!((exclusive([63.0, -63.0, 0.0]) - 3968.0).abs() < 1e-9);
        assert!(exclusive([1.01, -1.0, 0.0]) > 1e-4);
        assert_eq!(exclusive([6000.0, 0.0, 0.0]), 0.0);
        assert_eq!(exclusive([0.0, -5000.0, 0.0]), 0.0);
        assert_eq!(exclusive([1.0, -1.0, 0.0]), 0.0);
        assert_eq!(exclusive([0.5, -1.5, 0.0]), 0.0);
    }

    #[test]
    fn test_rate_rows_are_one_sided_for_pedals() {
        let model = model();
        let builder = CollocationConstraintBuilder::new(&model);
        let x = [0.0, 0.0, 0.0, 0.0, 0.0, 20.0];
        let fd_max = model.config().powertrain.max_drive_force;
        let dt = 0.1;

        // releasing full drive within one step is allowed
        let mut vars = interval(x, [fd_max, 0.0, 0.0], 0.0, x, dt);
        vars.u_next = Some([0.0, 0.0, 0.0]);
        let mut set = ConstraintSet::new();
        builder.add_constraints(&vars, &mut set);
        assert_eq!(set.labelled(LABEL_DRIVE_RATE).map(|r| r.violation()).sum::<f64>(), 0.0);

        // applying it is not
        vars.u = [0.0, 0.0, 0.0];
        vars.u_next = Some([fd_max, 0.0, 0.0]);
        set.clear();
        builder.add_constraints(&vars, &mut set);
        let violation: f64 = set.labelled(LABEL_DRIVE_RATE).map(|r| r.violation()).sum();
        assert!((violation - (1.0 - dt)).abs() < 1e-12, "violation {violation}");

        // steering is limited both ways
        let rate = model.config().steering.max_steer_rate;
        vars.u = [0.0, 0.0, 0.0];
        vars.u_next = Some([0.0, 0.0, -2.0 * rate * dt]);
        set.clear();
        builder.add_constraints(&vars, &mut set);
        let violation: f64 = set.labelled(LABEL_STEER_RATE).map(|r| r.violation()).sum();
        assert!((violation - dt).abs() < 1e-12, "violation {violation}");
    }
}
