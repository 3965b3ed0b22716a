//! Constraint collection
//!
//! A [`ConstraintSet`] is a flat list of two-sided rows `lower <= expr <= upper`.
//! Problem builders register rows into it; solvers read the rows back.

use crate::scalar::Scalar;

/// A single constraint row.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintRow<T> {
    /// Short label identifying what produced the row.
    pub label: &'static str,
    pub lower: f64,
    pub expr: T,
    pub upper: f64,
}

impl<T: Scalar> ConstraintRow<T> {
    /// Distance of the row value from its admissible interval.
    pub fn violation(&self) -> f64 {
        let v = self.expr.value();
        (self.lower - v).max(v - self.upper).max(0.0)
    }
}

/// Collection of constraint rows registered by a problem builder.
#[derive(Debug, Clone)]
pub struct ConstraintSet<T> {
    rows: Vec<ConstraintRow<T>>,
}

impl<T> Default for ConstraintSet<T> {
    fn default() -> Self {
        ConstraintSet { rows: Vec::new() }
    }
}

impl<T: Scalar> ConstraintSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `expr == rhs`
    pub fn equal(&mut self, label: &'static str, expr: T, rhs: f64) {
        self.bounded(label, rhs, expr, rhs);
    }

    /// `expr <= upper`
    pub fn at_most(&mut self, label: &'static str, expr: T, upper: f64) {
        self.bounded(label, f64::NEG_INFINITY, expr, upper);
    }

    /// `expr >= lower`
    pub fn at_least(&mut self, label: &'static str, expr: T, lower: f64) {
        self.bounded(label, lower, expr, f64::INFINITY);
    }

    /// `lower <= expr <= upper`
    pub fn bounded(&mut self, label: &'static str, lower: f64, expr: T, upper: f64) {
        debug_assert!(lower <= upper, "empty interval for constraint {label}");
        self.rows.push(ConstraintRow {
            label,
            lower,
            expr,
            upper,
        });
    }

    pub fn rows(&self) -> &[ConstraintRow<T>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Rows carrying the given label, in registration order.
    pub fn labelled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a ConstraintRow<T>> + 'a {
        self.rows.iter().filter(move |row| row.label == label)
    }

    /// Largest violation over all rows (0 when feasible).
    pub fn max_violation(&self) -> f64 {
        self.rows
            .iter()
            .map(ConstraintRow::violation)
            .fold(0.0, f64::max)
    }
}
