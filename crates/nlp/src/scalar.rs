//! Differentiable scalar abstraction
//!
//! Every expression the optimizer sees (dynamics, constraints, cost) is written
//! once against [`Scalar`]. Evaluating it with `f64` gives values; evaluating it
//! with [`Dual64`] gives the directional derivative along the seeded variable.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_dual::Dual64;

/// Scalar type an expression can be built over.
pub trait Scalar:
    Copy
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
{
    /// Lift a constant into the scalar type (zero derivative).
    fn constant(value: f64) -> Self;

    /// The real part of the scalar.
    fn value(&self) -> f64;

    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn atan(self) -> Self;
    fn sqrt(self) -> Self;
    fn powi(self, n: i32) -> Self;

    fn zero() -> Self {
        Self::constant(0.0)
    }
}

impl Scalar for f64 {
    fn constant(value: f64) -> Self {
        value
    }

    fn value(&self) -> f64 {
        *self
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn atan(self) -> Self {
        f64::atan(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }
}

// Chain rule written out on the dual parts so the trait methods never
// collide with the ones num_dual provides for the same type.
impl Scalar for Dual64 {
    fn constant(value: f64) -> Self {
        Dual64::new(value, 0.0)
    }

    fn value(&self) -> f64 {
        self.re
    }

    fn sin(self) -> Self {
        Dual64::new(self.re.sin(), self.eps * self.re.cos())
    }

    fn cos(self) -> Self {
        Dual64::new(self.re.cos(), -self.eps * self.re.sin())
    }

    fn atan(self) -> Self {
        Dual64::new(self.re.atan(), self.eps / (1.0 + self.re * self.re))
    }

    fn sqrt(self) -> Self {
        let root = self.re.sqrt();
        Dual64::new(root, self.eps * 0.5 / root)
    }

    fn powi(self, n: i32) -> Self {
        match n {
            0 => Dual64::new(1.0, 0.0),
            _ => Dual64::new(
                self.re.powi(n),
                self.eps * f64::from(n) * self.re.powi(n - 1),
            ),
        }
    }
}

/// Seed variable `value` as the differentiation direction.
pub fn seed(value: f64) -> Dual64 {
    Dual64::new(value, 1.0)
}

/// Derivative part of a dual number.
pub fn derivative(value: &Dual64) -> f64 {
    value.eps
}
