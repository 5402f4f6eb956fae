//! Solutions and the common solver interface.

use crate::error::Result;
use crate::process::SolveControl;
use oxirel_logic::{EdgeId, Model};
use std::collections::BTreeSet;
use std::fmt;

/// How much a solution can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    /// Proven minimum cost.
    Optimal,
    /// Consistent, but not proven minimal.
    Heuristic,
}

/// Set of edges to toggle, relative to the most likely hard model.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Flipped edge ids.
    pub flips: BTreeSet<EdgeId>,
    /// Total flip cost.
    pub cost: f64,
    /// Optimality status.
    pub status: SolutionStatus,
}

impl Solution {
    /// Create a solution.
    pub fn new(flips: BTreeSet<EdgeId>, cost: f64, status: SolutionStatus) -> Self {
        Self {
            flips,
            cost,
            status,
        }
    }

    /// The empty solution.
    pub fn empty(status: SolutionStatus) -> Self {
        Self::new(BTreeSet::new(), 0.0, status)
    }

    /// Whether the cost is proven minimal.
    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }

    /// Number of flips.
    pub fn len(&self) -> usize {
        self.flips.len()
    }

    /// Whether nothing is flipped.
    pub fn is_empty(&self) -> bool {
        self.flips.is_empty()
    }

    /// Specific copy of `base_model` with the flips applied.
    pub fn apply(&self, base_model: &Model) -> Model {
        let mut model = base_model.create_specific_copy();
        model.symm_diff_all(&self.flips);
        model
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} flips, cost {:.6} ({:?})", self.flips.len(), self.cost, self.status)
    }
}

/// Common interface of every consistency solver.
pub trait ConsistencySolver: Send {
    /// Short solver name for logs and errors.
    fn name(&self) -> &'static str;

    /// Run (or continue) the solve. Returns [`SolveError::Paused`] or
    /// [`SolveError::Cancelled`] when stopped at a checkpoint.
    ///
    /// [`SolveError::Paused`]: crate::SolveError::Paused
    /// [`SolveError::Cancelled`]: crate::SolveError::Cancelled
    fn solve(&mut self, control: &SolveControl) -> Result<Solution>;

    /// Solution of the last completed solve.
    fn soln(&self) -> Option<&Solution>;

    /// Cost of the last completed solve.
    fn cost(&self) -> Option<f64> {
        self.soln().map(|s| s.cost)
    }
}

impl<S: ConsistencySolver + ?Sized> ConsistencySolver for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn solve(&mut self, control: &SolveControl) -> Result<Solution> {
        (**self).solve(control)
    }

    fn soln(&self) -> Option<&Solution> {
        (**self).soln()
    }
}
