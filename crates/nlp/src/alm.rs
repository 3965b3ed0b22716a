//! Augmented Lagrangian solver
//!
//! Outer loop: Powell-Hestenes-Rockafellar multiplier updates over the
//! two-sided constraint rows of an [`Nlp`], with one penalty per row. A row's
//! penalty only grows while that row is violated and its violation did not
//! shrink enough. Inner loop: PANOC from `optimization_engine`, which handles
//! the variable bounds by projection.
//!
//! The inner tolerance starts loose and is tightened by a constant factor per
//! outer iteration down to its final value. A point is accepted once the
//! inner solve converged at the final tolerance and every row is within the
//! constraint tolerance.
//!
//! The solver works on scaled variables `zeta = z / scale`. Gradients of each
//! stage are assembled from forward-mode dual seeds on that stage's support, so
//! a gradient costs `sum_k |support_k|` stage evaluations.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use num_dual::Dual64;
use optimization_engine::{
    constraints::Rectangle,
    panoc::{PANOCCache, PANOCOptimizer},
    Optimizer, Problem, SolverError,
};
use serde::{Deserialize, Serialize};

use crate::constraint::{ConstraintRow, ConstraintSet};
use crate::error::NlpError;
use crate::problem::Nlp;
use crate::scalar::Scalar;
use crate::{NlpSolution, NlpSolver, SolverStats};

/// Tuning of the augmented Lagrangian solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlmSettings {
    /// Maximum number of multiplier updates
    pub max_outer_iterations: usize,
    /// Maximum PANOC iterations per outer iteration
    pub max_inner_iterations: usize,
    /// PANOC tolerance of the first outer iteration
    pub initial_inner_tolerance: f64,
    /// Factor applied to the inner tolerance after each outer iteration
    pub inner_tolerance_update_factor: f64,
    /// Final PANOC fixed-point residual tolerance (scaled variables)
    pub inner_tolerance: f64,
    /// Maximum admissible row violation at convergence
    pub constraint_tolerance: f64,
    pub initial_penalty: f64,
    pub penalty_update_factor: f64,
    /// A row's penalty grows when its violation did not drop below this
    /// fraction of the previous one
    pub sufficient_decrease: f64,
    pub max_penalty: f64,
    pub lbfgs_memory: usize,
    /// Wall-clock budget for one solve in milliseconds (None = unbounded)
    pub max_duration_ms: Option<u64>,
}

impl Default for AlmSettings {
    fn default() -> Self {
        AlmSettings {
            max_outer_iterations: 50,
            max_inner_iterations: 1000,
            initial_inner_tolerance: 1e-1,
            inner_tolerance_update_factor: 0.1,
            inner_tolerance: 1e-4,
            constraint_tolerance: 1e-4,
            initial_penalty: 10.0,
            penalty_update_factor: 3.0,
            sufficient_decrease: 0.25,
            max_penalty: 1e8,
            lbfgs_memory: 10,
            max_duration_ms: None,
        }
    }
}

impl AlmSettings {
    pub fn with_max_outer_iterations(mut self, iterations: usize) -> Self {
        self.max_outer_iterations = iterations;
        self
    }

    pub fn with_max_inner_iterations(mut self, iterations: usize) -> Self {
        self.max_inner_iterations = iterations;
        self
    }

    pub fn with_constraint_tolerance(mut self, tolerance: f64) -> Self {
        self.constraint_tolerance = tolerance;
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Inner tolerance used at outer iteration `outer`.
    pub fn inner_tolerance_at(&self, outer: usize) -> f64 {
        let exponent = i32::try_from(outer).unwrap_or(i32::MAX);
        let scheduled = self.initial_inner_tolerance * self.inner_tolerance_update_factor.powi(exponent);
        scheduled.max(self.inner_tolerance)
    }

    /// Grow the penalty of every row that is still violated and did not
    /// improve enough since the previous outer iteration.
    fn update_penalties(&self, penalties: &mut [f64], violations: &[f64], previous: &[f64]) {
        for ((c, &now), &before) in penalties.iter_mut().zip(violations).zip(previous) {
            if now > self.constraint_tolerance && now > self.sufficient_decrease * before {
                *c = (*c * self.penalty_update_factor).min(self.max_penalty);
            }
        }
    }
}

/// Augmented Lagrangian NLP solver backed by PANOC.
#[derive(Debug, Clone, Default)]
pub struct AlmSolver {
    pub settings: AlmSettings,
}

impl AlmSolver {
    pub fn new(settings: AlmSettings) -> Self {
        AlmSolver { settings }
    }
}

/// Distance of `value + y / c` from the row interval, the PHR excess.
fn excess(row: &ConstraintRow<f64>, y: f64, c: f64) -> f64 {
    let shifted = row.expr + y / c;
    shifted - shifted.max(row.lower).min(row.upper)
}

/// Row structure and scaled-space evaluation of a problem.
struct Evaluator<'p, P: Nlp> {
    problem: &'p P,
    scale: &'p [f64],
    row_offsets: Vec<usize>,
    num_rows: usize,
}

impl<'p, P: Nlp> Evaluator<'p, P> {
    fn new(problem: &'p P, z: &[f64]) -> Self {
        let mut row_offsets = Vec::with_capacity(problem.num_stages());
        let mut rows = ConstraintSet::new();
        let mut num_rows = 0;
        for k in 0..problem.num_stages() {
            rows.clear();
            problem.stage(k, z, &mut rows);
            row_offsets.push(num_rows);
            num_rows += rows.len();
        }
        Evaluator {
            problem,
            scale: problem.layout().scale(),
            row_offsets,
            num_rows,
        }
    }

    fn physical(&self, zeta: &[f64]) -> Vec<f64> {
        zeta.iter().zip(self.scale).map(|(v, s)| v * s).collect()
    }

    /// Objective value and all row values (with bounds) at a scaled point.
    fn evaluate(&self, zeta: &[f64]) -> (f64, ConstraintSet<f64>) {
        let z = self.physical(zeta);
        let mut rows = ConstraintSet::new();
        let mut cost = 0.0;
        for k in 0..self.problem.num_stages() {
            cost += self.problem.stage(k, &z, &mut rows);
        }
        (cost, rows)
    }

    fn augmented_cost(&self, zeta: &[f64], multipliers: &[f64], penalties: &[f64]) -> f64 {
        let (cost, rows) = self.evaluate(zeta);
        let penalty_term: f64 = rows
            .rows()
            .iter()
            .zip(multipliers.iter().zip(penalties))
            .map(|(row, (&y, &c))| {
                let e = excess(row, y, c);
                c * e * e
            })
            .sum();
        cost + 0.5 * penalty_term
    }

    fn augmented_gradient(&self, zeta: &[f64], multipliers: &[f64], penalties: &[f64], grad: &mut [f64]) {
        grad.iter_mut().for_each(|g| *g = 0.0);
        let mut z: Vec<Dual64> = self
            .physical(zeta)
            .into_iter()
            .map(<Dual64 as Scalar>::constant)
            .collect();
        let mut rows = ConstraintSet::new();

        for k in 0..self.problem.num_stages() {
            let offset = self.row_offsets[k];
            for &j in self.problem.stage_support(k) {
                z[j].eps = 1.0;
                rows.clear();
                let cost = self.problem.stage(k, &z, &mut rows);
                z[j].eps = 0.0;

                let mut d = cost.eps;
                for (r, row) in rows.rows().iter().enumerate() {
                    let (y, c) = (multipliers[offset + r], penalties[offset + r]);
                    let shifted = row.expr.re + y / c;
                    let e = shifted - shifted.max(row.lower).min(row.upper);
                    d += c * e * row.expr.eps;
                }
                grad[j] += d * self.scale[j];
            }
        }
    }
}

impl NlpSolver for AlmSolver {
    fn solve<P: Nlp>(&self, problem: &P, initial_guess: &[f64]) -> Result<NlpSolution, NlpError> {
        let settings = &self.settings;
        let layout = problem.layout();
        let n = layout.len();
        if initial_guess.len() != n {
            return Err(NlpError::DimensionMismatch {
                expected: n,
                got: initial_guess.len(),
            });
        }

        let start = Instant::now();
        let budget = settings.max_duration_ms.map(Duration::from_millis);

        let mut z0 = initial_guess.to_vec();
        layout.project(&mut z0);
        let evaluator = Evaluator::new(problem, &z0);
        let num_rows = evaluator.num_rows;

        let scale = layout.scale();
        let lower: Vec<f64> = layout.lower().iter().zip(scale).map(|(v, s)| v / s).collect();
        let upper: Vec<f64> = layout.upper().iter().zip(scale).map(|(v, s)| v / s).collect();
        let mut zeta: Vec<f64> = z0.iter().zip(scale).map(|(v, s)| v / s).collect();

        let mut multipliers = vec![0.0; num_rows];
        let mut penalties = vec![settings.initial_penalty; num_rows];
        let mut previous = vec![f64::INFINITY; num_rows];
        let mut violations = vec![0.0; num_rows];
        let mut stats = SolverStats {
            penalty: settings.initial_penalty,
            ..SolverStats::default()
        };
        let mut cache = PANOCCache::new(n, settings.initial_inner_tolerance, settings.lbfgs_memory);

        debug!(
            "alm: {} variables, {} constraint rows, {} stages",
            n,
            num_rows,
            problem.num_stages()
        );
        for block in layout.blocks() {
            debug!("alm: block {} at {} ({} variables)", block.name, block.offset, block.len);
        }

        for outer in 0..settings.max_outer_iterations {
            let remaining = match budget {
                Some(budget) => match budget.checked_sub(start.elapsed()) {
                    Some(remaining) if !remaining.is_zero() => Some(remaining),
                    _ => {
                        warn!("alm: out of time after {} outer iterations", outer);
                        return Err(NlpError::OutOfTime {
                            last_iterate: evaluator.physical(&zeta),
                            stats,
                        });
                    }
                },
                None => None,
            };

            let inner_tolerance = settings.inner_tolerance_at(outer);
            let inner = {
                let y = &multipliers;
                let c = &penalties;
                let cost = |u: &[f64], value: &mut f64| -> Result<(), SolverError> {
                    *value = evaluator.augmented_cost(u, y, c);
                    Ok(())
                };
                let gradient = |u: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
                    evaluator.augmented_gradient(u, y, c, grad);
                    Ok(())
                };
                let bounds = Rectangle::new(Some(&lower[..]), Some(&upper[..]));
                let inner_problem = Problem::new(&bounds, gradient, cost);
                let mut panoc = PANOCOptimizer::new(inner_problem, &mut cache)
                    .with_tolerance(inner_tolerance)
                    .with_max_iter(settings.max_inner_iterations);
                if let Some(remaining) = remaining {
                    panoc = panoc.with_max_duration(remaining);
                }
                panoc.solve(&mut zeta)
            };

            let inner = match inner {
                Ok(status) => status,
                Err(err) => {
                    warn!("alm: inner solver failed: {:?}", err);
                    return Err(NlpError::NonFinite {
                        last_iterate: evaluator.physical(&zeta),
                        stats,
                    });
                }
            };

            let (cost, rows) = evaluator.evaluate(&zeta);
            for (r, row) in rows.rows().iter().enumerate() {
                multipliers[r] = penalties[r] * excess(row, multipliers[r], penalties[r]);
                violations[r] = row.violation();
            }
            let violation = rows.max_violation();

            stats.outer_iterations = outer + 1;
            stats.inner_iterations += inner.iterations();
            stats.constraint_violation = violation;
            stats.cost = cost;

            debug!(
                "alm: outer {} cost {:.6e} violation {:.3e} max penalty {:.1e} inner {} residual {:.2e} (tolerance {:.1e})",
                outer,
                cost,
                violation,
                stats.penalty,
                inner.iterations(),
                inner.norm_fpr(),
                inner_tolerance
            );

            if !cost.is_finite() || !violation.is_finite() {
                return Err(NlpError::NonFinite {
                    last_iterate: evaluator.physical(&zeta),
                    stats,
                });
            }

            let at_final_tolerance = inner_tolerance <= settings.inner_tolerance;
            if at_final_tolerance && inner.has_converged() && violation <= settings.constraint_tolerance {
                info!(
                    "alm: converged in {} outer / {} inner iterations, cost {:.6e}",
                    stats.outer_iterations, stats.inner_iterations, cost
                );
                return Ok(NlpSolution {
                    z: evaluator.physical(&zeta),
                    multipliers,
                    stats,
                });
            }

            settings.update_penalties(&mut penalties, &violations, &previous);
            previous.copy_from_slice(&violations);
            stats.penalty = penalties.iter().copied().fold(settings.initial_penalty, f64::max);
        }

        warn!(
            "alm: not converged after {} outer iterations (violation {:.3e})",
            stats.outer_iterations, stats.constraint_violation
        );
        Err(NlpError::NotConverged {
            last_iterate: evaluator.physical(&zeta),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{DecisionLayout, VariableSpec};
    use approx::assert_relative_eq;

    /// min (x - 2)^2 + (y - 1)^2  s.t.  x + y == 2,  x^2 <= 2.25,  y in [-5, 5]
    struct CircleProblem {
        layout: DecisionLayout,
        support: Vec<usize>,
    }

    impl CircleProblem {
        fn new() -> Self {
            let mut layout = DecisionLayout::new();
            layout.declare("x", [VariableSpec::free(1.0)]);
            layout.declare("y", [VariableSpec::new(-5.0, 5.0, 2.0)]);
            CircleProblem {
                layout,
                support: vec![0, 1],
            }
        }
    }

    impl Nlp for CircleProblem {
        fn layout(&self) -> &DecisionLayout {
            &self.layout
        }

        fn num_stages(&self) -> usize {
            1
        }

        fn stage_support(&self, _k: usize) -> &[usize] {
            &self.support
        }

        fn stage<T: Scalar>(&self, _k: usize, z: &[T], constraints: &mut ConstraintSet<T>) -> T {
            let (x, y) = (z[0], z[1]);
            constraints.equal("sum", x + y, 2.0);
            constraints.at_most("square", x.powi(2), 2.25);
            (x - 2.0).powi(2) + (y - 1.0).powi(2)
        }
    }

    #[test]
    fn test_equality_and_inequality_active() {
        // Unconstrained optimum (2, 1) violates both rows; the solution sits
        // on x = 1.5, y = 0.5.
        let problem = CircleProblem::new();
        let solver = AlmSolver::new(AlmSettings::default().with_max_inner_iterations(500));
        let solution = solver.solve(&problem, &[0.0, 0.0]).expect("converges");

        assert_relative_eq!(solution.z[0], 1.5, epsilon = 1e-3);
        assert_relative_eq!(solution.z[1], 0.5, epsilon = 1e-3);
        assert!(solution.stats.constraint_violation <= 1e-4);
    }

    #[test]
    fn test_rejects_wrong_initial_guess_length() {
        let problem = CircleProblem::new();
        let result = AlmSolver::default().solve(&problem, &[0.0]);
        assert!(matches!(
            result,
            Err(NlpError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let problem = CircleProblem::new();
        let evaluator = Evaluator::new(&problem, &[0.0, 0.0]);
        let zeta = [0.3, -0.4];
        let y = [0.7, -0.2];
        let c = [3.0, 40.0];

        let mut grad = [0.0; 2];
        evaluator.augmented_gradient(&zeta, &y, &c, &mut grad);

        let h = 1e-6;
        for i in 0..2 {
            let mut plus = zeta;
            let mut minus = zeta;
            plus[i] += h;
            minus[i] -= h;
            let fd = (evaluator.augmented_cost(&plus, &y, &c) - evaluator.augmented_cost(&minus, &y, &c))
                / (2.0 * h);
            assert_relative_eq!(grad[i], fd, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_inner_tolerance_schedule() {
        let settings = AlmSettings::default();
        assert_eq!(settings.inner_tolerance_at(0), settings.initial_inner_tolerance);
        assert_relative_eq!(
            settings.inner_tolerance_at(1),
            settings.initial_inner_tolerance * settings.inner_tolerance_update_factor
        );
        // floored at the final tolerance
        assert_eq!(settings.inner_tolerance_at(20), settings.inner_tolerance);
        assert_eq!(settings.inner_tolerance_at(usize::MAX), settings.inner_tolerance);
    }

    #[test]
    fn test_only_stalled_rows_get_more_penalty() {
        let settings = AlmSettings::default();
        let c0 = settings.initial_penalty;
        let mut penalties = vec![c0; 4];
        // satisfied, improving, stalled, stalled at the cap
        penalties[3] = settings.max_penalty;
        let previous = [1e-2, 1e-1, 1e-2, 1e-2];
        let now = [1e-6, 1e-3, 9e-3, 9e-3];
        settings.update_penalties(&mut penalties, &now, &previous);
        assert_eq!(penalties, vec![c0, c0, c0 * settings.penalty_update_factor, settings.max_penalty]);
    }

    #[test]
    fn test_exhausted_budget_reports_out_of_time() {
        let problem = CircleProblem::new();
        let settings = AlmSettings::default().with_max_duration(Duration::ZERO);
        assert_eq!(settings.max_duration_ms, Some(0));
        match AlmSolver::new(settings).solve(&problem, &[0.0, 0.0]) {
            Err(NlpError::OutOfTime { last_iterate, stats }) => {
                assert_eq!(last_iterate, vec![0.0, 0.0]);
                assert_eq!(stats.outer_iterations, 0);
            }
            other => panic!("expected OutOfTime, got {:?}", other),
        }
    }

    #[test]
    fn test_iteration_cap_reports_last_iterate() {
        let problem = CircleProblem::new();
        let settings = AlmSettings::default()
            .with_max_outer_iterations(1)
            .with_max_inner_iterations(1)
            .with_constraint_tolerance(1e-12);
        match AlmSolver::new(settings).solve(&problem, &[0.0, 0.0]) {
            Err(NlpError::NotConverged { last_iterate, stats }) => {
                assert_eq!(last_iterate.len(), 2);
                assert_eq!(stats.outer_iterations, 1);
            }
            other => panic!("expected NotConverged, got {:?}", other),
        }
    }
}
