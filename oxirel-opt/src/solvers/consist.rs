//! Branch-and-Bound over the LP Relaxation.
//!
//! Exact 0/1 solver for problem matrices. Every node solves the LP
//! relaxation of the rows still free; a node is pruned when the fixed cost
//! plus the LP bound cannot beat the incumbent, and becomes a leaf when the
//! relaxation is integral. Otherwise it branches on the first row whose LP
//! value is not 0 or 1:
//!
//! - ADD: the row is in the solution. Its cost is fixed and its entries are
//!   subtracted from the column demands; columns left with no demand and no
//!   negative entry are satisfied for good and leave the matrix.
//! - REMOVE: the row is out of the solution and leaves the matrix.
//!
//! After either decision a column that can no longer reach its demand makes
//! the branch infeasible. Matrix changes go through the stitch log, so
//! undoing a decision is a sequence of `restitch` calls.
//!
//! The search is an explicit stack of frames kept across pauses. Progress is
//! the sum of `2^-depth` over closed nodes.
//!
//! ## References
//!
//! - Land & Doig (1960): "An automatic method of solving discrete programming
//!   problems"
//! - Wolsey (1998): "Integer Programming", chapter 7

use super::approx::{ApproxConfig, ApproxStats, approx_cover};
use crate::error::{Result, SolveError};
use crate::problem::{ConsistProblem, ProblemMatrix};
use crate::process::SolveControl;
use crate::solution::{ConsistencySolver, Solution, SolutionStatus};
use oxirel_math::{COST_COL, ColId, MathError, RowId, Simplex, SimplexConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, trace};

/// Configuration for branch-and-bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchBoundConfig {
    /// Maximum nodes visited per solve.
    pub max_nodes: usize,
    /// Integrality and bound tolerance.
    pub tolerance: f64,
    /// Seed the incumbent with LP rounding.
    pub seed_with_approx: bool,
    /// Maximum simplex pivots per node.
    pub max_pivots: usize,
}

impl Default for BranchBoundConfig {
    fn default() -> Self {
        Self {
            max_nodes: 200_000,
            tolerance: 1e-6,
            seed_with_approx: true,
            max_pivots: 100_000,
        }
    }
}

/// Statistics for branch-and-bound.
#[derive(Debug, Clone, Default)]
pub struct BranchBoundStats {
    /// Nodes visited.
    pub nodes: u64,
    /// LP relaxations solved.
    pub lp_solves: u64,
    /// Nodes pruned by the bound.
    pub bound_prunes: u64,
    /// Branches cut as infeasible.
    pub infeasible_prunes: u64,
    /// Incumbent improvements.
    pub incumbents: u64,
    /// Maximum depth reached.
    pub max_depth: usize,
}

/// Decisions to revert when leaving a branch.
#[derive(Debug, Clone)]
struct Trail {
    row: RowId,
    added: bool,
    cost: f64,
    restitches: usize,
    demand: Vec<(ColId, f64)>,
}

#[derive(Debug, Clone)]
enum Frame {
    Visit,
    Branch { row: RowId, add: bool },
    Undo(Trail),
}

/// Resumable branch-and-bound over one problem matrix.
#[derive(Debug)]
pub struct BranchBound {
    pm: ProblemMatrix,
    config: BranchBoundConfig,
    stats: BranchBoundStats,
    lp: Simplex,
    stack: Vec<Frame>,
    fixed: Vec<RowId>,
    fixed_cost: f64,
    depth: usize,
    progress: f64,
    best: Option<(BTreeSet<RowId>, f64)>,
    started: bool,
}

impl BranchBound {
    /// Search over `pm`.
    pub fn new(pm: ProblemMatrix, config: BranchBoundConfig) -> Self {
        let lp = Simplex::with_config(SimplexConfig {
            max_iterations: config.max_pivots,
            ..SimplexConfig::default()
        });
        Self {
            pm,
            config,
            stats: BranchBoundStats::default(),
            lp,
            stack: vec![Frame::Visit],
            fixed: Vec::new(),
            fixed_cost: 0.0,
            depth: 0,
            progress: 0.0,
            best: None,
            started: false,
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> &BranchBoundStats {
        &self.stats
    }

    /// Best selection found so far.
    pub fn incumbent(&self) -> Option<&(BTreeSet<RowId>, f64)> {
        self.best.as_ref()
    }

    /// Fraction of the search tree closed.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Run to completion, or until `control` stops the search. A paused
    /// search continues where it stopped on the next call.
    ///
    /// Returns the optimal rows and cost, with [`SolutionStatus::Heuristic`]
    /// when the node limit cut the search short.
    pub fn run(&mut self, control: &SolveControl) -> Result<(BTreeSet<RowId>, f64, SolutionStatus)> {
        if !self.started {
            self.start()?;
        }
        let mut limited = false;
        while !self.stack.is_empty() {
            control.checkpoint()?;
            if self.stats.nodes as usize >= self.config.max_nodes {
                limited = true;
                break;
            }
            let Some(frame) = self.stack.pop() else {
                break;
            };
            match frame {
                Frame::Visit => self.visit()?,
                Frame::Branch { row, add } => self.branch(row, add)?,
                Frame::Undo(trail) => self.undo(trail)?,
            }
            control.report(self.progress, "branch and bound");
        }

        match self.best.clone() {
            Some((rows, cost)) if limited => {
                debug!(nodes = self.stats.nodes, "node limit reached with an incumbent");
                Ok((rows, cost, SolutionStatus::Heuristic))
            }
            Some((rows, cost)) => Ok((rows, cost, SolutionStatus::Optimal)),
            None if limited => Err(SolveError::NodeLimit(self.config.max_nodes)),
            None => Err(SolveError::Infeasible),
        }
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        if self.pm.has_empty_clause() {
            self.stack.clear();
            return Ok(());
        }
        let cols: Vec<ColId> = self.pm.matrix.constraint_cols().collect();
        if cols.iter().any(|&c| !self.reachable(c)) {
            self.stack.clear();
            return Ok(());
        }
        if self.config.seed_with_approx {
            let approx = ApproxConfig {
                tolerance: self.config.tolerance,
                ..ApproxConfig::default()
            };
            match approx_cover(&self.pm, &approx, &mut ApproxStats::default()) {
                Ok((rows, cost)) => {
                    debug!(cost, "seeded incumbent by rounding");
                    self.best = Some((rows, cost));
                }
                Err(SolveError::Infeasible | SolveError::NoSolution { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Whether column `col` can still reach its demand from the free rows.
    fn reachable(&self, col: ColId) -> bool {
        let max: f64 = self
            .pm
            .matrix
            .column(col)
            .iter()
            .map(|&(_, a)| a.max(0.0))
            .sum();
        max >= self.pm.demand_of(col) - self.config.tolerance
    }

    fn close(&mut self) {
        self.progress += 0.5f64.powi(self.depth as i32);
    }

    fn visit(&mut self) -> Result<()> {
        self.stats.nodes += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.depth);
        let tol = self.config.tolerance;

        self.stats.lp_solves += 1;
        let bound = match self.lp.simplex_solve_with(&self.pm.matrix, &self.pm.demand) {
            Ok(lp_cost) => self.fixed_cost + lp_cost,
            Err(MathError::NoPivotRow { .. }) => {
                self.stats.infeasible_prunes += 1;
                self.close();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if let Some((_, best)) = &self.best
            && bound >= best - tol
        {
            self.stats.bound_prunes += 1;
            self.close();
            return Ok(());
        }

        let fractional = self
            .lp
            .soln()
            .iter()
            .find(|&(_, &v)| (v - 1.0).abs() > tol)
            .map(|(&r, _)| r);
        match fractional {
            Some(row) => {
                trace!(row, depth = self.depth, bound, "branching");
                self.stack.push(Frame::Branch { row, add: false });
                self.stack.push(Frame::Branch { row, add: true });
            }
            None => {
                let free: BTreeSet<RowId> = self.lp.soln().keys().copied().collect();
                // Fixed rows are unstitched, so their cost comes from the trail.
                let cost = self.fixed_cost + self.pm.cost_of(&free);
                let rows: BTreeSet<RowId> = self.fixed.iter().copied().chain(free).collect();
                self.stats.incumbents += 1;
                info!(rows = rows.len(), cost, depth = self.depth, "new incumbent");
                self.best = Some((rows, cost));
                self.close();
            }
        }
        Ok(())
    }

    fn branch(&mut self, row: RowId, add: bool) -> Result<()> {
        self.depth += 1;
        let entries = self.pm.matrix.row(row);
        let cost = self.pm.matrix.cost(row);
        self.pm.matrix.unstitch_row(row)?;
        let mut trail = Trail {
            row,
            added: add,
            cost,
            restitches: 1,
            demand: Vec::new(),
        };
        if add {
            self.fixed.push(row);
            self.fixed_cost += cost;
        }

        let mut feasible = true;
        for (col, a) in entries {
            if col == COST_COL {
                continue;
            }
            let d = self.pm.demand_of(col);
            if add {
                trail.demand.push((col, d));
                self.pm.demand.insert(col, d - a);
            }
            let d = self.pm.demand_of(col);
            let settled = d <= self.config.tolerance
                && self
                    .pm
                    .matrix
                    .column(col)
                    .iter()
                    .all(|&(_, v)| v > 0.0);
            if settled {
                if self.pm.matrix.col_indices(col).is_some() {
                    self.pm.matrix.unstitch_col(col)?;
                    trail.restitches += 1;
                }
            } else if !self.reachable(col) {
                feasible = false;
            }
        }

        self.stack.push(Frame::Undo(trail));
        if feasible {
            self.stack.push(Frame::Visit);
        } else {
            self.stats.infeasible_prunes += 1;
            self.close();
        }
        Ok(())
    }

    fn undo(&mut self, trail: Trail) -> Result<()> {
        for _ in 0..trail.restitches {
            self.pm.matrix.restitch()?;
        }
        for (col, d) in trail.demand.into_iter().rev() {
            self.pm.demand.insert(col, d);
        }
        if trail.added {
            self.fixed.pop();
            self.fixed_cost -= trail.cost;
        }
        trace!(row = trail.row, "undone");
        self.depth -= 1;
        Ok(())
    }
}

/// Exact solver over the full problem matrix.
#[derive(Debug)]
pub struct ConsistSolver {
    problem: ConsistProblem,
    config: BranchBoundConfig,
    search: Option<BranchBound>,
    stats: BranchBoundStats,
    soln: Option<Solution>,
}

impl ConsistSolver {
    /// Create a solver with the default configuration.
    pub fn new(problem: ConsistProblem) -> Self {
        Self::with_config(problem, BranchBoundConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(problem: ConsistProblem, config: BranchBoundConfig) -> Self {
        Self {
            problem,
            config,
            search: None,
            stats: BranchBoundStats::default(),
            soln: None,
        }
    }

    /// The problem being solved.
    pub fn problem(&self) -> &ConsistProblem {
        &self.problem
    }

    /// Statistics of the last (or current) search.
    pub fn stats(&self) -> &BranchBoundStats {
        self.search.as_ref().map_or(&self.stats, BranchBound::stats)
    }

    /// Whether a paused search is waiting to be resumed.
    pub fn is_suspended(&self) -> bool {
        self.search.is_some()
    }
}

impl ConsistencySolver for ConsistSolver {
    fn name(&self) -> &'static str {
        "branch_bound"
    }

    fn solve(&mut self, control: &SolveControl) -> Result<Solution> {
        let mut search = match self.search.take() {
            Some(search) => {
                info!(nodes = search.stats().nodes, "resuming branch and bound");
                search
            }
            None => {
                let pm = self.problem.build_problem_matrix()?;
                BranchBound::new(pm, self.config.clone())
            }
        };
        match search.run(control) {
            Err(SolveError::Paused) => {
                self.search = Some(search);
                Err(SolveError::Paused)
            }
            outcome => {
                self.stats = search.stats().clone();
                let (flips, cost, status) = outcome?;
                info!(
                    flips = flips.len(),
                    cost,
                    nodes = self.stats.nodes,
                    "branch and bound finished"
                );
                let solution = Solution::new(flips, cost, status);
                self.soln = Some(solution.clone());
                Ok(solution)
            }
        }
    }

    fn soln(&self) -> Option<&Solution> {
        self.soln.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ClauseSet;
    use crate::problem::tests::fixture;

    #[test]
    fn test_fixture_optimum() {
        let mut solver = ConsistSolver::new(fixture());
        let solution = solver.solve(&SolveControl::new()).unwrap();
        let e12 = solver.problem().model().id(0, 1, 2);
        assert_eq!(solution.flips.iter().copied().collect::<Vec<_>>(), vec![e12]);
        assert!(solution.is_optimal());
        let ln4 = 4f64.ln();
        assert!(solution.cost >= ln4 * (1.0 - 1e-4) && solution.cost <= ln4 * (1.0 + 1e-4));
        assert!(solver.stats().nodes >= 1);
    }

    #[test]
    fn test_without_seed_same_optimum() {
        let config = BranchBoundConfig {
            seed_with_approx: false,
            ..Default::default()
        };
        let mut solver = ConsistSolver::with_config(fixture(), config);
        let solution = solver.solve(&SolveControl::new()).unwrap();
        assert_eq!(solution.len(), 1);
        assert!(solver.problem().is_consistent_with(&solution.flips).unwrap());
    }

    #[test]
    fn test_undo_restores_matrix() {
        let mut problem = fixture();
        let pm = problem.build_problem_matrix().unwrap();
        let before = pm.matrix.create_copy();
        let demand = pm.demand.clone();
        let mut search = BranchBound::new(pm, BranchBoundConfig::default());
        search.run(&SolveControl::new()).unwrap();
        assert_eq!(search.pm.matrix, before);
        assert_eq!(search.pm.demand, demand);
        assert_eq!(search.pm.matrix.stitch_depth(), 0);
        assert_eq!(search.depth, 0);
    }

    #[test]
    fn test_empty_clause_infeasible() {
        let logic = oxirel_logic::Logic::parse("-> hyp(1,2)").unwrap();
        let mut model = oxirel_logic::Model::new(2);
        model.add_specific_graph("hyp");
        let mut solver = ConsistSolver::new(ConsistProblem::new(logic, model).unwrap());
        assert!(matches!(
            solver.solve(&SolveControl::new()),
            Err(SolveError::Infeasible)
        ));
    }

    #[test]
    fn test_consistent_model_empty_solution() {
        let mut problem = fixture();
        let mut seen = ClauseSet::new();
        let e12 = problem.model().id(0, 1, 2);
        let fixed = problem.apply(&[e12]);
        assert!(
            problem
                .build_growing_problem_matrix(&fixed, &mut seen)
                .unwrap()
                .is_none()
        );
        let mut search = BranchBound::new(Default::default(), BranchBoundConfig::default());
        let (rows, cost, status) = search.run(&SolveControl::new()).unwrap();
        assert!(rows.is_empty());
        assert_eq!(cost, 0.0);
        assert_eq!(status, SolutionStatus::Optimal);
    }

    #[test]
    fn test_pause_keeps_stack() {
        let mut solver = ConsistSolver::new(fixture());
        let control = SolveControl::new();
        control.request_pause();
        assert!(matches!(solver.solve(&control), Err(SolveError::Paused)));
        assert!(solver.is_suspended());
        control.clear_pause();
        let solution = solver.solve(&control).unwrap();
        assert_eq!(solution.len(), 1);
        assert!(!solver.is_suspended());
    }
}
