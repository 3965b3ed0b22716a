//! Simplified Pacejka lateral tyre model with load sensitivity.

use nlp::Scalar;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Magic formula coefficients for one axle.
///
/// `Fy = mu * Fz * (1 + eps * Fz / Fz0) * sin(C * atan(B*a - E*(B*a - atan(B*a))))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacejkaTyre {
    /// Stiffness factor
    pub b: f64,
    /// Shape factor
    pub c: f64,
    /// Curvature factor
    pub e: f64,
    /// Nominal vertical load in N
    pub fz0: f64,
    /// Load sensitivity
    pub eps: f64,
}

impl PacejkaTyre {
    pub fn new(b: f64, c: f64, e: f64, fz0: f64, eps: f64) -> Self {
        PacejkaTyre { b, c, e, fz0, eps }
    }

    /// Lateral force in N for slip angle `alpha` (rad) and vertical load `fz` (N).
    pub fn lateral_force<T: Scalar>(&self, alpha: T, fz: T, mu: f64) -> T {
        let ba = alpha * self.b;
        let shaped = (ba - (ba - ba.atan()) * self.e).atan() * self.c;
        fz * mu * (fz * (self.eps / self.fz0) + 1.0) * shaped.sin()
    }

    /// Check coefficients, naming fields by `names` (b, c, e, fz0, eps).
    pub(crate) fn validate(&self, names: &[&'static str; 5]) -> Result<(), ConfigError> {
        let values = [self.b, self.c, self.e, self.fz0, self.eps];
        let must_be_positive = [true, true, false, true, false];
        for ((&field, value), positive) in names.iter().zip(values).zip(must_be_positive) {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field, value });
            }
            if positive && value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        Ok(())
    }
}

pub(crate) const FRONT_TYRE_FIELDS: [&str; 5] = [
    "front_tyre.b",
    "front_tyre.c",
    "front_tyre.e",
    "front_tyre.fz0",
    "front_tyre.eps",
];

pub(crate) const REAR_TYRE_FIELDS: [&str; 5] = [
    "rear_tyre.b",
    "rear_tyre.c",
    "rear_tyre.e",
    "rear_tyre.fz0",
    "rear_tyre.eps",
];

impl Default for PacejkaTyre {
    fn default() -> Self {
        PacejkaTyre::new(9.62, 2.59, 1.0, 3000.0, -0.0813)
    }
}
