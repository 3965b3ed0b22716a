//! Minimum-time tracking cost

use nlp::Scalar;
use vehicle::{NU, NX};
use vehicle::dynamics::state;

use crate::config::RacingMpcConfig;
use crate::reference::ReferencePoint;

/// Per-interval cost: elapsed time, tracking error of the interval end node,
/// and regularisation of control effort and control change.
#[derive(Debug, Clone, PartialEq)]
pub struct MinTimeTrackingCost {
    q_time: f64,
    q_contour: f64,
    q_lag: f64,
    q_heading: f64,
    r_u: [f64; NU],
    r_du: [f64; NU],
    scale_u: [f64; NU],
}

impl MinTimeTrackingCost {
    pub fn new(config: &RacingMpcConfig) -> Self {
        MinTimeTrackingCost {
            q_time: config.q_time,
            q_contour: config.q_contour,
            q_lag: config.q_lag,
            q_heading: config.q_heading,
            r_u: config.r_u,
            r_du: config.r_du,
            scale_u: config.scale_u,
        }
    }

    /// Cost of interval `k` given its end node `x_next` and the reference
    /// point of that node.
    pub fn interval<T: Scalar>(
        &self,
        reference: &ReferencePoint,
        x_next: &[T; NX],
        u: &[T; NU],
        u_next: Option<&[T; NU]>,
        dt: T,
    ) -> T {
        let (contour, lag) = reference.errors(x_next[state::X], x_next[state::Y]);
        let heading = (x_next[state::YAW] - reference.yaw).cos();

        let mut cost = dt * self.q_time
            + contour * contour * self.q_contour
            + lag * lag * self.q_lag
            + (-heading + 1.0) * self.q_heading;

        for j in 0..NU {
            let effort = u[j] / self.scale_u[j];
            cost = cost + effort * effort * self.r_u[j];
            if let Some(u_next) = u_next {
                let change = (u_next[j] - u[j]) / self.scale_u[j];
                cost = cost + change * change * self.r_du[j];
            }
        }
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_line() -> ReferencePoint {
        ReferencePoint {
            x: 10.0,
            y: 0.0,
            yaw: 0.0,
            curvature: 0.0,
            half_width: 5.0,
        }
    }

    #[test]
    fn test_on_reference_cost_is_time() {
        let cost = MinTimeTrackingCost::new(&RacingMpcConfig::default());
        let x = [10.0, 0.0, 0.0, 0.0, 0.0, 30.0];
        let zero: [f64; NU] = [0.0; NU];
        let value = cost.interval(&on_line(), &x, &zero, Some(&zero), 0.25);
        assert!((value - 0.25).abs() < 1e-12, "cost {value}");
    }

    #[test]
    fn test_tracking_terms() {
        let config = RacingMpcConfig::default();
        let cost = MinTimeTrackingCost::new(&config);
        let zero: [f64; NU] = [0.0; NU];
        let x = [12.0, 1.0, 0.0, 0.0, 0.0, 30.0];
        let value = cost.interval(&on_line(), &x, &zero, None, 0.0);
        let expected = config.q_contour * 1.0 + config.q_lag * 4.0;
        assert!((value - expected).abs() < 1e-12);

        // a full turn of yaw carries no heading penalty
        let x = [10.0, 0.0, std::f64::consts::TAU, 0.0, 0.0, 30.0];
        assert!(cost.interval(&on_line(), &x, &zero, None, 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_rate_term_only_with_successor() {
        let config = RacingMpcConfig::default();
        let cost = MinTimeTrackingCost::new(&config);
        let x = [10.0, 0.0, 0.0, 0.0, 0.0, 30.0];
        let u = [config.scale_u[0], 0.0, 0.0];
        let u_next = [0.0, 0.0, 0.0];
        let without = cost.interval(&on_line(), &x, &u, None, 0.0);
        let with = cost.interval(&on_line(), &x, &u, Some(&u_next), 0.0);
        assert!((without - config.r_u[0]).abs() < 1e-12);
        assert!((with - without - config.r_du[0]).abs() < 1e-12);
    }
}
