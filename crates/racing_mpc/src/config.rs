use nlp::AlmSettings;
use serde::{Deserialize, Serialize};
use vehicle::{ConfigError, NU, NX};

/// Horizon, cost weights and scaling of the racing MPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RacingMpcConfig {
    /// Number of intervals N (N + 1 state nodes)
    pub horizon: usize,
    /// Weight on each interval duration
    pub q_time: f64,
    /// Weight on squared lateral distance to the reference
    pub q_contour: f64,
    /// Weight on squared along-track distance to the reference
    pub q_lag: f64,
    /// Weight on `1 - cos(heading error)`
    pub q_heading: f64,
    /// Weights on scaled control magnitude
    pub r_u: [f64; NU],
    /// Weights on scaled control change between nodes
    pub r_du: [f64; NU],
    /// Normalisation of states; also divides the collocation defects
    pub scale_x: [f64; NX],
    pub scale_u: [f64; NU],
    pub scale_t: f64,
    pub scale_gamma_y: f64,
    /// Interval duration bounds in s
    pub t_min: f64,
    pub t_max: f64,
    /// Speed bounds in m/s
    pub min_speed: f64,
    pub max_speed: f64,
    /// Maximum RK4 sub-step used when simulating the warm start, in s
    pub integration_step: f64,
    pub solver: AlmSettings,
}

impl Default for RacingMpcConfig {
    fn default() -> Self {
        RacingMpcConfig {
            horizon: 20,
            q_time: 1.0,
            q_contour: 0.1,
            q_lag: 0.1,
            q_heading: 1.0,
            r_u: [1e-3, 1e-3, 1e-3],
            r_du: [1e-2, 1e-2, 1.0],
            // about one interval of travel, so position defects and the
            // tracking terms stay O(1) in the solver's variables
            scale_x: [4.0, 4.0, 0.5, 0.5, 0.05, 10.0],
            scale_u: [7100.0, 5600.0, 0.2],
            scale_t: 0.1,
            scale_gamma_y: 1000.0,
            t_min: 0.01,
            t_max: 1.0,
            min_speed: 1.0,
            max_speed: 100.0,
            integration_step: 0.01,
            solver: AlmSettings::default(),
        }
    }
}

fn check(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field, value });
    }
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    check(field, value, 0.0, f64::MAX)?;
    if value == 0.0 {
        return Err(ConfigError::NonPositive { field, value });
    }
    Ok(())
}

impl RacingMpcConfig {
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_solver(mut self, solver: AlmSettings) -> Self {
        self.solver = solver;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon < 2 {
            return Err(ConfigError::OutOfRange {
                field: "horizon",
                value: self.horizon as f64,
                min: 2.0,
                max: f64::MAX,
            });
        }
        check("q_time", self.q_time, 0.0, f64::MAX)?;
        check("q_contour", self.q_contour, 0.0, f64::MAX)?;
        check("q_lag", self.q_lag, 0.0, f64::MAX)?;
        check("q_heading", self.q_heading, 0.0, f64::MAX)?;
        for (&r, &r_dot) in self.r_u.iter().zip(&self.r_du) {
            check("r_u", r, 0.0, f64::MAX)?;
            check("r_du", r_dot, 0.0, f64::MAX)?;
        }
        for &s in &self.scale_x {
            positive("scale_x", s)?;
        }
        for &s in &self.scale_u {
            positive("scale_u", s)?;
        }
        positive("scale_t", self.scale_t)?;
        positive("scale_gamma_y", self.scale_gamma_y)?;
        positive("t_min", self.t_min)?;
        check("t_max", self.t_max, self.t_min, f64::MAX)?;
        positive("min_speed", self.min_speed)?;
        check("max_speed", self.max_speed, self.min_speed, f64::MAX)?;
        positive("integration_step", self.integration_step)?;
        Ok(())
    }
}
