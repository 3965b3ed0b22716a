//! Planar double-track vehicle model
//!
//! State `x = [x, y, yaw, yaw_rate, sideslip, speed]`, control
//! `u = [drive_force, brake_force, steer]`. Corner order everywhere is
//! FL, FR, RL, RR. The model is generic over [`Scalar`] so the same equations
//! feed numeric simulation and the optimizer's derivatives.

use log::warn;
use nalgebra::{SVector, Vector4};
use nlp::{Dual64, Scalar, derivative, seed};
use thiserror::Error;

use crate::config::{ConfigError, VehicleConfig};

pub const NX: usize = 6;
pub const NU: usize = 3;

/// Gravitational acceleration in m/s^2
pub const GRAVITY: f64 = 9.8;

pub type State = SVector<f64, NX>;
pub type Control = SVector<f64, NU>;

/// Indices into the state vector.
pub mod state {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const YAW: usize = 2;
    pub const YAW_RATE: usize = 3;
    pub const SLIP: usize = 4;
    pub const SPEED: usize = 5;
}

/// Indices into the control vector.
pub mod control {
    pub const DRIVE: usize = 0;
    pub const BRAKE: usize = 1;
    pub const STEER: usize = 2;
}

/// Indices into per-corner force arrays.
pub mod corner {
    pub const FL: usize = 0;
    pub const FR: usize = 1;
    pub const RL: usize = 2;
    pub const RR: usize = 3;
}

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("non-finite {what} passed to the dynamics")]
    NonFiniteInput { what: &'static str },
    #[error("load transfer did not converge after {iterations} iterations (residual {residual} N)")]
    LoadTransferDiverged { iterations: usize, residual: f64 },
}

/// State derivative plus the per-corner tyre forces that produced it.
#[derive(Debug, Clone, Copy)]
pub struct DynamicsOutput<T> {
    pub x_dot: [T; NX],
    pub fx: [T; 4],
    pub fy: [T; 4],
    pub fz: [T; 4],
}

/// Numeric dynamics with the lateral load transfer resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardDynamics {
    pub x_dot: State,
    pub fx: Vector4<f64>,
    pub fy: Vector4<f64>,
    pub fz: Vector4<f64>,
    /// Resolved lateral load transfer in N
    pub gamma_y: f64,
    pub iterations: usize,
}

const NEWTON_MAX_ITERATIONS: usize = 50;
const NEWTON_TOLERANCE: f64 = 1e-6; // N

/// Immutable vehicle model. Derived constants are computed once here.
#[derive(Debug, Clone)]
pub struct DoubleTrackModel {
    config: VehicleConfig,
    /// CG to front axle in m
    lf: f64,
    /// CG to rear axle in m
    lr: f64,
    /// Static front load per wheel in N
    static_front_load: f64,
    /// Static rear load per wheel in N
    static_rear_load: f64,
    /// `0.5 * cd * rho * A`
    drag_factor: f64,
    /// Rolling resistance force in N
    rolling_resistance: f64,
    /// `h / (0.5 * (tw_f + tw_r))`
    roll_lever: f64,
}

impl DoubleTrackModel {
    pub fn new(config: VehicleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let c = &config.chassis;
        let a = &config.aero;
        let l = c.wheel_base;
        let lf = c.cg_ratio * l;
        let lr = l - lf;
        let weight = c.total_mass * GRAVITY;
        let model = DoubleTrackModel {
            lf,
            lr,
            static_front_load: 0.5 * weight * lr / l,
            static_rear_load: 0.5 * weight * lf / l,
            drag_factor: 0.5 * a.drag_coeff * a.air_density * a.frontal_area,
            rolling_resistance: c.fr * weight,
            roll_lever: c.cg_height / (0.5 * (c.tw_f + c.tw_r)),
            config,
        };
        log::debug!(
            "double track model: lf {:.3} m, lr {:.3} m, static loads {:.1}/{:.1} N",
            model.lf,
            model.lr,
            model.static_front_load,
            model.static_rear_load
        );
        Ok(model)
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn lf(&self) -> f64 {
        self.lf
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn mass(&self) -> f64 {
        self.config.chassis.total_mass
    }

    /// Aerodynamic drag plus rolling resistance at `speed`, in N.
    pub fn resistive_force(&self, speed: f64) -> f64 {
        self.drag_factor * speed * speed + self.rolling_resistance
    }

    /// State derivative at `(x, u)` for a given lateral load transfer.
    pub fn state_derivative<T: Scalar>(
        &self,
        x: &[T; NX],
        u: &[T; NU],
        gamma_y: T,
    ) -> DynamicsOutput<T> {
        let c = &self.config.chassis;
        let aero = &self.config.aero;
        let mu = self.config.friction_coefficient;
        let kd = self.config.powertrain.kd;
        let kb = self.config.brake.bias;
        let kroll = self.config.roll_distribution_front;
        let m = c.total_mass;
        let l = c.wheel_base;
        let (lf, lr) = (self.lf, self.lr);
        let (twf, twr) = (c.tw_f, c.tw_r);

        let phi = x[state::YAW];
        let omega = x[state::YAW_RATE];
        let beta = x[state::SLIP];
        let v = x[state::SPEED];
        let fd = u[control::DRIVE];
        let fb = u[control::BRAKE];
        let delta = u[control::STEER];
        let v_sq = v * v;

        // longitudinal tyre forces
        let fx_f = fd * (0.5 * kd) + fb * (0.5 * kb) - 0.5 * self.rolling_resistance * lr / l;
        let fx_r = fd * (0.5 * (1.0 - kd)) + fb * (0.5 * (1.0 - kb))
            - 0.5 * self.rolling_resistance * lf / l;

        let ax = (fd + fb - v_sq * self.drag_factor - self.rolling_resistance) / m;

        // vertical tyre forces
        let pitch = ax * (0.5 * c.cg_height / l * m);
        let aero_load = 0.25 * aero.air_density * aero.frontal_area;
        let fz_f = -pitch + v_sq * (aero_load * aero.cl_f) + self.static_front_load;
        let fz_r = pitch + v_sq * (aero_load * aero.cl_r) + self.static_rear_load;
        let fz = [
            fz_f - gamma_y * kroll,
            fz_f + gamma_y * kroll,
            fz_r - gamma_y * (1.0 - kroll),
            fz_r + gamma_y * (1.0 - kroll),
        ];

        // tyre slip angles
        let v_lat = v * beta.sin();
        let v_long = v * beta.cos();
        let front_lat = omega * lf + v_lat;
        let rear_lat = omega * lr - v_lat;
        let alpha = [
            delta - (front_lat / (v_long - omega * (0.5 * twf))).atan(),
            delta - (front_lat / (v_long + omega * (0.5 * twf))).atan(),
            (rear_lat / (v_long - omega * (0.5 * twr))).atan(),
            (rear_lat / (v_long + omega * (0.5 * twr))).atan(),
        ];

        let front = &self.config.front_tyre;
        let rear = &self.config.rear_tyre;
        let fy = [
            front.lateral_force(alpha[corner::FL], fz[corner::FL], mu),
            front.lateral_force(alpha[corner::FR], fz[corner::FR], mu),
            rear.lateral_force(alpha[corner::RL], fz[corner::RL], mu),
            rear.lateral_force(alpha[corner::RR], fz[corner::RR], mu),
        ];
        let fx = [fx_f, fx_f, fx_r, fx_r];

        let fx_front = fx[corner::FL] + fx[corner::FR];
        let fx_rear = fx[corner::RL] + fx[corner::RR];
        let fy_front = fy[corner::FL] + fy[corner::FR];
        let fy_rear = fy[corner::RL] + fy[corner::RR];
        let drag = v_sq * self.drag_factor;
        let (sin_b, cos_b) = (beta.sin(), beta.cos());
        let (sin_db, cos_db) = ((delta - beta).sin(), (delta - beta).cos());
        let (sin_d, cos_d) = (delta.sin(), delta.cos());

        let v_dot = (fx_rear * cos_b + fx_front * cos_db + fy_rear * sin_b
            - fy_front * sin_db
            - drag * cos_b)
            / m;
        let beta_dot = -omega
            + (-fx_rear * sin_b + fx_front * sin_db + fy_rear * cos_b + fy_front * cos_db
                + drag * sin_b)
                / (v * m);
        let omega_dot = ((fx[corner::RR] - fx[corner::RL]) * (0.5 * twr) - fy_rear * lr
            + ((fx[corner::FR] - fx[corner::FL]) * cos_d + (fy[corner::FL] - fy[corner::FR]) * sin_d)
                * (0.5 * twf)
            + (fy_front * cos_d + fx_front * sin_d) * lf)
            / c.moi;

        DynamicsOutput {
            x_dot: [
                v * phi.cos(),
                v * phi.sin(),
                omega,
                omega_dot,
                beta_dot,
                v_dot,
            ],
            fx,
            fy,
            fz,
        }
    }

    /// Lateral load transfer implied by a set of tyre forces at steer `delta`.
    pub fn lateral_load_transfer<T: Scalar>(&self, out: &DynamicsOutput<T>, delta: T) -> T {
        let fx_front = out.fx[corner::FL] + out.fx[corner::FR];
        let fy_front = out.fy[corner::FL] + out.fy[corner::FR];
        let fy_rear = out.fy[corner::RL] + out.fy[corner::RR];
        (fy_rear + fx_front * delta.sin() + fy_front * delta.cos()) * self.roll_lever
    }

    /// Zero when `gamma_y` is consistent with the tyre forces it produces.
    pub fn load_transfer_residual<T: Scalar>(&self, x: &[T; NX], u: &[T; NU], gamma_y: T) -> T {
        let out = self.state_derivative(x, u, gamma_y);
        gamma_y - self.lateral_load_transfer(&out, u[control::STEER])
    }

    /// Numeric dynamics with the load transfer solved by Newton iteration.
    ///
    /// Speeds below `min_evaluation_speed` are raised to it first, since the
    /// sideslip equation divides by speed.
    pub fn forward_dynamics(&self, x: &State, u: &Control) -> Result<ForwardDynamics, ModelError> {
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput { what: "state" });
        }
        if u.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput { what: "control" });
        }

        let mut x_eval: [f64; NX] = std::array::from_fn(|i| x[i]);
        let v_min = self.config.min_evaluation_speed;
        if x_eval[state::SPEED] < v_min {
            warn!(
                "speed {:.3} m/s below evaluation floor, clamping to {:.3} m/s",
                x_eval[state::SPEED],
                v_min
            );
            x_eval[state::SPEED] = v_min;
        }
        let u_eval: [f64; NU] = std::array::from_fn(|i| u[i]);

        let (gamma_y, iterations) = self.solve_load_transfer(&x_eval, &u_eval)?;
        let out = self.state_derivative(&x_eval, &u_eval, gamma_y);
        Ok(ForwardDynamics {
            x_dot: State::from(out.x_dot),
            fx: Vector4::from(out.fx),
            fy: Vector4::from(out.fy),
            fz: Vector4::from(out.fz),
            gamma_y,
            iterations,
        })
    }

    fn solve_load_transfer(&self, x: &[f64; NX], u: &[f64; NU]) -> Result<(f64, usize), ModelError> {
        let x_dual = x.map(<Dual64 as Scalar>::constant);
        let u_dual = u.map(<Dual64 as Scalar>::constant);
        let mut gamma = 0.0;
        let mut residual = f64::INFINITY;
        for iteration in 0..NEWTON_MAX_ITERATIONS {
            let r = self.load_transfer_residual(&x_dual, &u_dual, seed(gamma));
            residual = r.value();
            let slope = derivative(&r);
            if !residual.is_finite() || !slope.is_finite() || slope == 0.0 {
                break;
            }
            if residual.abs() < NEWTON_TOLERANCE {
                return Ok((gamma, iteration));
            }
            gamma -= residual / slope;
        }
        warn!("load transfer Newton iteration failed, residual {residual:.3e} N");
        Err(ModelError::LoadTransferDiverged {
            iterations: NEWTON_MAX_ITERATIONS,
            residual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> DoubleTrackModel {
        DoubleTrackModel::new(VehicleConfig::default()).unwrap()
    }

    #[test]
    fn test_golden_point_is_finite_and_deterministic() {
        let model = model();
        let x = State::from([0.0, 0.0, 0.0, 0.1, 0.02, 40.0]);
        let u = Control::from([500.0, 0.0, 0.1]);
        let first = model.forward_dynamics(&x, &u).unwrap();
        let second = model.forward_dynamics(&x, &u).unwrap();

        assert!(first.x_dot.iter().all(|v| v.is_finite()), "{:?}", first.x_dot);
        assert_eq!(first, second);

        let speed_sq = first.x_dot[state::X].powi(2) + first.x_dot[state::Y].powi(2);
        assert_relative_eq!(speed_sq, 40.0 * 40.0, max_relative = 1e-12);
        assert_eq!(first.x_dot[state::YAW], 0.1);

        // a left turn loads the right side of the car
        assert!(first.gamma_y > 0.0, "gamma_y {}", first.gamma_y);
        assert!(first.fz[corner::FR] > first.fz[corner::FL]);
    }

    #[test]
    fn test_resolved_load_transfer_zeroes_residual() {
        let model = model();
        let x = [0.0, 0.0, 0.3, 0.2, -0.01, 25.0];
        let u = [1000.0, 0.0, 0.05];
        let out = model
            .forward_dynamics(&State::from(x), &Control::from(u))
            .unwrap();
        let residual = model.load_transfer_residual(&x, &u, out.gamma_y);
        assert!(residual.abs() < NEWTON_TOLERANCE, "residual {residual}");
        assert!(out.iterations < 10, "took {} iterations", out.iterations);
    }

    #[test]
    fn test_straight_trim_is_equilibrium() {
        let model = model();
        let v = 30.0;
        let x = State::from([0.0, 0.0, 0.0, 0.0, 0.0, v]);
        let u = Control::from([model.resistive_force(v), 0.0, 0.0]);
        let out = model.forward_dynamics(&x, &u).unwrap();

        assert!(out.gamma_y.abs() < 1e-9);
        assert!(out.x_dot[state::YAW_RATE].abs() < 1e-9);
        assert!(out.x_dot[state::SLIP].abs() < 1e-9);
        assert!(out.x_dot[state::SPEED].abs() < 1e-9, "v_dot {}", out.x_dot[state::SPEED]);
        assert_relative_eq!(out.x_dot[state::X], v, max_relative = 1e-12);
    }

    #[test]
    fn test_vertical_loads_sum_to_weight_plus_downforce() {
        let model = model();
        let v = 50.0;
        let x = [0.0, 0.0, 0.0, 0.0, 0.0, v];
        let out = model.state_derivative(&x, &[2000.0, 0.0, 0.0], 800.0);
        let total: f64 = out.fz.iter().sum();
        let a = &model.config().aero;
        let downforce = 0.5 * (a.cl_f + a.cl_r) * a.air_density * a.frontal_area * v * v;
        assert_relative_eq!(total, model.mass() * GRAVITY + downforce, max_relative = 1e-12);
    }

    #[test]
    fn test_dual_derivative_matches_finite_difference() {
        let model = model();
        let x = [1.0, 2.0, 0.4, 0.15, 0.03, 35.0];
        let u = [800.0, -200.0, 0.08];
        let gamma = 400.0;
        let h = 1e-5;

        let mut x_plus = x;
        let mut x_minus = x;
        x_plus[state::SLIP] += h;
        x_minus[state::SLIP] -= h;
        let fd = (model.state_derivative(&x_plus, &u, gamma).x_dot[state::YAW_RATE]
            - model.state_derivative(&x_minus, &u, gamma).x_dot[state::YAW_RATE])
            / (2.0 * h);

        let mut x_dual = x.map(<Dual64 as Scalar>::constant);
        x_dual[state::SLIP] = Dual64::new(x[state::SLIP], 1.0);
        let ad = model
            .state_derivative(&x_dual, &u.map(<Dual64 as Scalar>::constant), <Dual64 as Scalar>::constant(gamma))
            .x_dot[state::YAW_RATE]
            .eps;
        assert_relative_eq!(ad, fd, max_relative = 1e-5);
    }

    #[test]
    fn test_standstill_is_clamped() {
        let model = model();
        let x = State::from([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let u = Control::from([1000.0, 0.0, 0.0]);
        let out = model.forward_dynamics(&x, &u).unwrap();
        assert!(out.x_dot.iter().all(|v| v.is_finite()));
        assert_relative_eq!(out.x_dot[state::X], model.config().min_evaluation_speed);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let model = model();
        let x = State::from([0.0, 0.0, f64::NAN, 0.0, 0.0, 10.0]);
        let u = Control::zeros();
        assert_eq!(
            model.forward_dynamics(&x, &u),
            Err(ModelError::NonFiniteInput { what: "state" })
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = VehicleConfig::default();
        config.chassis.total_mass = -1.0;
        assert!(DoubleTrackModel::new(config).is_err());
    }
}
