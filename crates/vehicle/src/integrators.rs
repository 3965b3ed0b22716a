use crate::dynamics::State;

/// A one-step explicit integration scheme over a fallible derivative.
pub trait Integrator {
    /// Advance `x` by `dt` using `f(x) = dx/dt`.
    fn step<F, E>(&self, x: &State, dt: f64, f: &mut F) -> Result<State, E>
    where
        F: FnMut(&State) -> Result<State, E>;
}

/// Classic fourth-order Runge-Kutta.
#[derive(Debug, Clone, Copy, Default)]
pub struct RungeKutta4;

impl Integrator for RungeKutta4 {
    fn step<F, E>(&self, x: &State, dt: f64, f: &mut F) -> Result<State, E>
    where
        F: FnMut(&State) -> Result<State, E>,
    {
        let k1 = f(x)?;
        let k2 = f(&(x + k1 * (0.5 * dt)))?;
        let k3 = f(&(x + k2 * (0.5 * dt)))?;
        let k4 = f(&(x + k3 * dt))?;
        Ok(x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0))
    }
}

/// Splits an interval into equal sub-steps no longer than `max_step`.
#[derive(Debug, Clone)]
pub struct FixedStepIntegrator<I: Integrator> {
    pub integrator: I,
    pub max_step: f64,
}

impl<I: Integrator> FixedStepIntegrator<I> {
    pub fn new(integrator: I, max_step: f64) -> Self {
        FixedStepIntegrator {
            integrator,
            max_step,
        }
    }

    /// Number of sub-steps used for an interval of length `duration`.
    pub fn substeps(&self, duration: f64) -> usize {
        if duration <= 0.0 || self.max_step <= 0.0 {
            return 0;
        }
        ((duration / self.max_step).ceil() as usize).max(1)
    }

    /// Integrate `x` forward by `duration`.
    pub fn integrate<F, E>(&self, x: &State, duration: f64, mut f: F) -> Result<State, E>
    where
        F: FnMut(&State) -> Result<State, E>,
    {
        let n = self.substeps(duration);
        let mut x = *x;
        if n == 0 {
            return Ok(x);
        }
        let dt = duration / n as f64;
        for _ in 0..n {
            x = self.integrator.step(&x, dt, &mut f)?;
        }
        Ok(x)
    }
}
