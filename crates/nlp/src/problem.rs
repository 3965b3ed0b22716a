//! Decision-variable layout and the stagewise NLP interface

use crate::constraint::ConstraintSet;
use crate::scalar::Scalar;

/// Bounds and normalisation scale of one scalar decision variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableSpec {
    pub lower: f64,
    pub upper: f64,
    /// The solver works on `value / scale`.
    pub scale: f64,
}

impl VariableSpec {
    pub fn new(lower: f64, upper: f64, scale: f64) -> Self {
        VariableSpec { lower, upper, scale }
    }

    pub fn free(scale: f64) -> Self {
        VariableSpec::new(f64::NEG_INFINITY, f64::INFINITY, scale)
    }
}

/// A contiguous block of decision variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableBlock {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
}

impl VariableBlock {
    /// Global index of the `i`-th entry of this block.
    pub fn index(&self, i: usize) -> usize {
        debug_assert!(i < self.len, "index {i} out of block {}", self.name);
        self.offset + i
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Ordered set of decision-variable blocks with their bounds and scales.
#[derive(Debug, Clone, Default)]
pub struct DecisionLayout {
    blocks: Vec<VariableBlock>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    scale: Vec<f64>,
}

impl DecisionLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new block of decision variables, one spec per entry.
    pub fn declare<I>(&mut self, name: &'static str, specs: I) -> VariableBlock
    where
        I: IntoIterator<Item = VariableSpec>,
    {
        let offset = self.lower.len();
        for spec in specs {
            debug_assert!(spec.scale > 0.0, "non-positive scale in block {name}");
            self.lower.push(spec.lower);
            self.upper.push(spec.upper);
            self.scale.push(spec.scale);
        }
        let block = VariableBlock {
            name,
            offset,
            len: self.lower.len() - offset,
        };
        self.blocks.push(block);
        block
    }

    /// Overwrite the bounds of a single entry.
    pub fn set_bounds(&mut self, index: usize, lower: f64, upper: f64) {
        self.lower[index] = lower;
        self.upper[index] = upper;
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn blocks(&self) -> &[VariableBlock] {
        &self.blocks
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Clamp a physical-unit point into the variable bounds.
    pub fn project(&self, z: &mut [f64]) {
        for ((value, lo), hi) in z.iter_mut().zip(&self.lower).zip(&self.upper) {
            *value = value.max(*lo).min(*hi);
        }
    }
}

/// A nonlinear program split into stages.
///
/// Each stage touches a small, fixed subset of the decision variables (its
/// support), contributes a cost term, and registers a structurally fixed set
/// of constraint rows. Stage functions must be pure.
pub trait Nlp {
    fn layout(&self) -> &DecisionLayout;

    fn num_stages(&self) -> usize;

    /// Global indices of the variables stage `k` reads.
    fn stage_support(&self, k: usize) -> &[usize];

    /// Evaluate stage `k` at the physical-unit point `z`, registering its
    /// constraint rows and returning its cost contribution.
    fn stage<T: Scalar>(&self, k: usize, z: &[T], constraints: &mut ConstraintSet<T>) -> T;
}
