//! Growing Relaxations.
//!
//! Instead of grounding every rule instantiation up front, start from the
//! clauses the most likely hard model violates, solve, apply the solution,
//! collect the clauses the new candidate violates, and repeat until the
//! candidate is consistent. Each clause set is a relaxation of the full
//! problem, so the first consistent candidate produced by an exact inner
//! solve is a global optimum.
//!
//! [`GrowingSolver`] rebuilds its matrix from the accumulated clauses every
//! iteration and reduces it when it is a pure covering problem.
//! [`ResFreeSolver`] keeps one matrix and appends only the new columns.

use super::approx::{ApproxConfig, ApproxStats, approx_cover};
use super::consist::{BranchBound, BranchBoundConfig};
use crate::error::{Result, SolveError};
use crate::problem::{ClauseSet, ConsistProblem, ProblemMatrix};
use crate::process::SolveControl;
use crate::solution::{ConsistencySolver, Solution, SolutionStatus};
use oxirel_logic::EdgeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, info};

/// Configuration for the growing solvers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowingConfig {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Solve every iteration exactly (branch-and-bound) instead of by
    /// LP rounding.
    pub exact: bool,
    /// Reduce pure covering matrices before solving.
    pub reduce: bool,
}

impl Default for GrowingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            exact: true,
            reduce: true,
        }
    }
}

/// Statistics for the growing solvers.
#[derive(Debug, Clone, Default)]
pub struct GrowingStats {
    /// Completed iterations.
    pub iterations: u64,
    /// Clauses accumulated.
    pub clauses: u64,
    /// Rows removed by reduction.
    pub rows_reduced: u64,
    /// Columns removed by reduction.
    pub cols_reduced: u64,
    /// Branch-and-bound nodes over all iterations.
    pub nodes: u64,
}

/// Iteration bookkeeping shared by both growing solvers.
#[derive(Debug, Default)]
struct Growth {
    seen: ClauseSet,
    iteration: usize,
    flips: BTreeSet<EdgeId>,
    exact: bool,
    /// `seen` already holds the clauses violated by `flips`.
    pending: bool,
}

/// Solve one iteration's matrix.
fn solve_matrix(
    pm: ProblemMatrix,
    exact: bool,
    branch_bound: &BranchBoundConfig,
    approx: &ApproxConfig,
    stats: &mut GrowingStats,
    control: &SolveControl,
) -> Result<(BTreeSet<EdgeId>, bool)> {
    if exact {
        let mut search = BranchBound::new(pm, branch_bound.clone());
        let outcome = search.run(control);
        stats.nodes += search.stats().nodes;
        let (rows, _, status) = outcome?;
        Ok((rows, status == SolutionStatus::Optimal))
    } else {
        let (rows, _) = approx_cover(&pm, approx, &mut ApproxStats::default())?;
        Ok((rows, false))
    }
}

fn limit_reached(solver: &'static str, growth: &Growth, limit: usize) -> SolveError {
    error!(
        solver,
        iterations = growth.iteration,
        clauses = growth.seen.len(),
        flips = ?growth.flips,
        "growing relaxation did not converge"
    );
    SolveError::IterationLimit { solver, limit }
}

fn finish(problem: &ConsistProblem, growth: &Growth) -> Solution {
    let cost = problem.cost_of(&growth.flips);
    let status = if growth.exact {
        SolutionStatus::Optimal
    } else {
        SolutionStatus::Heuristic
    };
    Solution::new(growth.flips.clone(), cost, status)
}

/// Growing relaxation that rebuilds its matrix every iteration.
#[derive(Debug)]
pub struct GrowingSolver {
    problem: ConsistProblem,
    config: GrowingConfig,
    branch_bound: BranchBoundConfig,
    approx: ApproxConfig,
    growth: Option<Growth>,
    stats: GrowingStats,
    soln: Option<Solution>,
}

impl GrowingSolver {
    /// Create a solver with the default configuration.
    pub fn new(problem: ConsistProblem) -> Self {
        Self::with_config(problem, GrowingConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(problem: ConsistProblem, config: GrowingConfig) -> Self {
        Self {
            problem,
            config,
            branch_bound: BranchBoundConfig::default(),
            approx: ApproxConfig::default(),
            growth: None,
            stats: GrowingStats::default(),
            soln: None,
        }
    }

    /// Use `branch_bound` and `approx` for the inner solves.
    pub fn with_inner(mut self, branch_bound: BranchBoundConfig, approx: ApproxConfig) -> Self {
        self.branch_bound = branch_bound;
        self.approx = approx;
        self
    }

    /// The problem being solved.
    pub fn problem(&self) -> &ConsistProblem {
        &self.problem
    }

    /// Get statistics.
    pub fn stats(&self) -> &GrowingStats {
        &self.stats
    }

    /// Model produced by the last completed solve.
    pub fn model(&self) -> Option<oxirel_logic::Model> {
        self.soln.as_ref().map(|s| self.problem.apply(&s.flips))
    }
}

impl ConsistencySolver for GrowingSolver {
    fn name(&self) -> &'static str {
        "growing"
    }

    fn solve(&mut self, control: &SolveControl) -> Result<Solution> {
        let mut growth = self.growth.take().unwrap_or_else(|| Growth {
            exact: self.config.exact,
            ..Growth::default()
        });
        let outcome = self.grow(&mut growth, control);
        if matches!(outcome, Err(SolveError::Paused)) {
            self.growth = Some(growth);
        }
        let solution = outcome?;
        self.soln = Some(solution.clone());
        Ok(solution)
    }

    fn soln(&self) -> Option<&Solution> {
        self.soln.as_ref()
    }
}

impl GrowingSolver {
    fn grow(&mut self, growth: &mut Growth, control: &SolveControl) -> Result<Solution> {
        loop {
            control.checkpoint()?;
            let mut pm = if growth.pending {
                self.problem.matrix_over(&growth.seen)
            } else {
                let candidate = self.problem.apply(&growth.flips);
                let Some(pm) = self
                    .problem
                    .build_growing_problem_matrix(&candidate, &mut growth.seen)?
                else {
                    info!(
                        iterations = growth.iteration,
                        clauses = growth.seen.len(),
                        "growing relaxation converged"
                    );
                    control.report(1.0, "converged");
                    return Ok(finish(&self.problem, growth));
                };
                if growth.iteration >= self.config.max_iterations {
                    return Err(limit_reached("growing", growth, self.config.max_iterations));
                }
                growth.iteration += 1;
                growth.pending = true;
                self.stats.iterations += 1;
                self.stats.clauses = growth.seen.len() as u64;
                pm
            };

            if self.config.reduce && pm.is_pure_cover() {
                let (rows, cols) = pm.reduce();
                self.problem.note_reduction(rows, cols);
                self.stats.rows_reduced += rows as u64;
                self.stats.cols_reduced += cols as u64;
            }
            let (rows, cols) = pm.complexity();
            debug!(iteration = growth.iteration, rows, cols, "growing iteration");

            let (flips, optimal) = solve_matrix(
                pm,
                self.config.exact,
                &self.branch_bound,
                &self.approx,
                &mut self.stats,
                control,
            )?;
            growth.exact &= optimal;
            growth.flips = flips;
            growth.pending = false;
            control.report(
                growth.iteration as f64 / self.config.max_iterations as f64,
                "growing",
            );
        }
    }
}

/// Growing relaxation over one persistent matrix.
///
/// Columns are appended as new clauses appear; the demand of every column
/// stays relative to the most likely hard model, so earlier columns never
/// need rebuilding.
#[derive(Debug)]
pub struct ResFreeSolver {
    problem: ConsistProblem,
    config: GrowingConfig,
    branch_bound: BranchBoundConfig,
    approx: ApproxConfig,
    growth: Option<(Growth, ProblemMatrix)>,
    stats: GrowingStats,
    soln: Option<Solution>,
}

impl ResFreeSolver {
    /// Create a solver with the default configuration.
    pub fn new(problem: ConsistProblem) -> Self {
        Self::with_config(problem, GrowingConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(problem: ConsistProblem, config: GrowingConfig) -> Self {
        Self {
            problem,
            config,
            branch_bound: BranchBoundConfig::default(),
            approx: ApproxConfig::default(),
            growth: None,
            stats: GrowingStats::default(),
            soln: None,
        }
    }

    /// Use `branch_bound` and `approx` for the inner solves.
    pub fn with_inner(mut self, branch_bound: BranchBoundConfig, approx: ApproxConfig) -> Self {
        self.branch_bound = branch_bound;
        self.approx = approx;
        self
    }

    /// The problem being solved.
    pub fn problem(&self) -> &ConsistProblem {
        &self.problem
    }

    /// Get statistics.
    pub fn stats(&self) -> &GrowingStats {
        &self.stats
    }

    /// Model produced by the last completed solve.
    pub fn model(&self) -> Option<oxirel_logic::Model> {
        self.soln.as_ref().map(|s| self.problem.apply(&s.flips))
    }

    fn grow(
        &mut self,
        growth: &mut Growth,
        pm: &mut ProblemMatrix,
        control: &SolveControl,
    ) -> Result<Solution> {
        loop {
            control.checkpoint()?;
            if !growth.pending {
                let candidate = self.problem.apply(&growth.flips);
                let added = self
                    .problem
                    .extend_problem_matrix(pm, &candidate, &mut growth.seen)?;
                if added == 0 {
                    info!(
                        iterations = growth.iteration,
                        columns = pm.complexity().1,
                        "residual-free relaxation converged"
                    );
                    control.report(1.0, "converged");
                    return Ok(finish(&self.problem, growth));
                }
                if growth.iteration >= self.config.max_iterations {
                    return Err(limit_reached("res_free", growth, self.config.max_iterations));
                }
                growth.iteration += 1;
                growth.pending = true;
                self.stats.iterations += 1;
                self.stats.clauses = growth.seen.len() as u64;
                debug!(iteration = growth.iteration, added, "residual-free iteration");
            }

            let mut work = ProblemMatrix::clone(pm);
            if self.config.reduce && work.is_pure_cover() {
                let (rows, cols) = work.reduce();
                self.stats.rows_reduced += rows as u64;
                self.stats.cols_reduced += cols as u64;
            }

            let (flips, optimal) = solve_matrix(
                work,
                self.config.exact,
                &self.branch_bound,
                &self.approx,
                &mut self.stats,
                control,
            )?;
            growth.exact &= optimal;
            growth.flips = flips;
            growth.pending = false;
            control.report(
                growth.iteration as f64 / self.config.max_iterations as f64,
                "residual-free",
            );
        }
    }
}

impl ConsistencySolver for ResFreeSolver {
    fn name(&self) -> &'static str {
        "res_free"
    }

    fn solve(&mut self, control: &SolveControl) -> Result<Solution> {
        let (mut growth, mut pm) = self.growth.take().unwrap_or_else(|| {
            (
                Growth {
                    exact: self.config.exact,
                    ..Growth::default()
                },
                ProblemMatrix::default(),
            )
        });
        let outcome = self.grow(&mut growth, &mut pm, control);
        if matches!(outcome, Err(SolveError::Paused)) {
            self.growth = Some((growth, pm));
        }
        let solution = outcome?;
        self.soln = Some(solution.clone());
        Ok(solution)
    }

    fn soln(&self) -> Option<&Solution> {
        self.soln.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::fixture;

    fn expected_model(problem: &ConsistProblem) -> oxirel_logic::Model {
        let mut model = problem.model().create_specific_copy();
        model.symm_diff_all(&[problem.model().id(0, 1, 2)]);
        model
    }

    #[test]
    fn test_growing_converges_to_optimum() {
        let mut solver = GrowingSolver::new(fixture());
        let solution = solver.solve(&SolveControl::new()).unwrap();
        assert!(solution.is_optimal());
        assert_eq!(solver.stats().iterations, 2);
        let model = solver.model().unwrap();
        let expected = expected_model(solver.problem());
        assert!(model.symm_diff(&expected).unwrap().is_empty());
    }

    #[test]
    fn test_res_free_converges_to_optimum() {
        let mut solver = ResFreeSolver::new(fixture());
        let solution = solver.solve(&SolveControl::new()).unwrap();
        assert_eq!(solution.len(), 1);
        assert_eq!(solver.stats().clauses, 4);
        let model = solver.model().unwrap();
        let expected = expected_model(solver.problem());
        assert!(model.symm_diff(&expected).unwrap().is_empty());
    }

    #[test]
    fn test_iteration_cap() {
        let config = GrowingConfig {
            max_iterations: 1,
            ..Default::default()
        };
        let mut solver = GrowingSolver::with_config(fixture(), config);
        let err = solver.solve(&SolveControl::new()).unwrap_err();
        assert!(matches!(err, SolveError::IterationLimit { limit: 1, .. }));
    }

    #[test]
    fn test_approx_inner_is_heuristic() {
        let config = GrowingConfig {
            exact: false,
            ..Default::default()
        };
        let mut solver = GrowingSolver::with_config(fixture(), config);
        let solution = solver.solve(&SolveControl::new()).unwrap();
        assert!(!solution.is_optimal());
        assert!(solver.problem().is_consistent_with(&solution.flips).unwrap());
    }
}
