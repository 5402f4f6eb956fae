//! LP Rounding with Superfluous-Row Removal.
//!
//! Solves the LP relaxation once, takes every row with a positive value,
//! repairs any column the rounding left uncovered by greedily adding the row
//! with the best deficit reduction per unit cost, then removes rows whose
//! every column stays covered without them. No backtracking: the result is
//! feasible but carries no optimality guarantee.

use crate::error::{Result, SolveError};
use crate::problem::{ConsistProblem, ProblemMatrix};
use crate::process::SolveControl;
use crate::solution::{ConsistencySolver, Solution, SolutionStatus};
use oxirel_math::{COST_COL, ColId, MathError, RowId, Simplex};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Order in which candidate rows are tested for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOrder {
    /// Most expensive rows first.
    #[default]
    DescendingCost,
    /// Cheapest rows first.
    AscendingCost,
    /// Ascending row id.
    Index,
}

/// Configuration for LP rounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproxConfig {
    /// Removal order.
    pub removal_order: RemovalOrder,
    /// LP values above this count as selected.
    pub tolerance: f64,
}

impl Default for ApproxConfig {
    fn default() -> Self {
        Self {
            removal_order: RemovalOrder::DescendingCost,
            tolerance: 1e-6,
        }
    }
}

/// Statistics for LP rounding.
#[derive(Debug, Clone, Default)]
pub struct ApproxStats {
    /// Rows selected by rounding.
    pub rounded: u64,
    /// Rows added during repair.
    pub repaired: u64,
    /// Rows removed as superfluous.
    pub removed: u64,
}

/// Per-column left-hand sides of a 0/1 selection.
struct Coverage<'a> {
    pm: &'a ProblemMatrix,
    lhs: FxHashMap<ColId, f64>,
}

impl<'a> Coverage<'a> {
    fn new(pm: &'a ProblemMatrix, selected: &BTreeSet<RowId>) -> Self {
        let mut lhs: FxHashMap<ColId, f64> =
            pm.matrix.constraint_cols().map(|c| (c, 0.0)).collect();
        for &r in selected {
            for (c, a) in pm.matrix.row(r) {
                if c != COST_COL {
                    *lhs.entry(c).or_insert(0.0) += a;
                }
            }
        }
        Self { pm, lhs }
    }

    fn deficit(&self, col: ColId) -> f64 {
        let lhs = self.lhs.get(&col).copied().unwrap_or(0.0);
        (self.pm.demand_of(col) - lhs).max(0.0)
    }

    fn total_deficit(&self) -> f64 {
        self.lhs.keys().map(|&c| self.deficit(c)).sum()
    }

    /// Change in total deficit if `row` toggles by `sign` (+1 add, -1 drop).
    fn deficit_change(&self, row: RowId, sign: f64) -> f64 {
        self.pm
            .matrix
            .row(row)
            .into_iter()
            .filter(|&(c, _)| c != COST_COL)
            .map(|(c, a)| {
                let lhs = self.lhs.get(&c).copied().unwrap_or(0.0);
                let d = self.pm.demand_of(c);
                (d - lhs - sign * a).max(0.0) - (d - lhs).max(0.0)
            })
            .sum()
    }

    fn toggle(&mut self, row: RowId, sign: f64) {
        for (c, a) in self.pm.matrix.row(row) {
            if c != COST_COL {
                *self.lhs.entry(c).or_insert(0.0) += sign * a;
            }
        }
    }
}

/// Round the LP relaxation of `pm` to a feasible 0/1 selection.
///
/// Returns the selected rows and their total cost, or
/// [`SolveError::Infeasible`] when the relaxation has no solution.
pub fn approx_cover(
    pm: &ProblemMatrix,
    config: &ApproxConfig,
    stats: &mut ApproxStats,
) -> Result<(BTreeSet<RowId>, f64)> {
    if pm.has_empty_clause() {
        return Err(SolveError::Infeasible);
    }
    let mut lp = Simplex::new();
    match lp.simplex_solve_with(&pm.matrix, &pm.demand) {
        Ok(_) => {}
        Err(MathError::NoPivotRow { .. }) => return Err(SolveError::Infeasible),
        Err(e) => return Err(e.into()),
    }
    let mut selected: BTreeSet<RowId> = lp
        .soln()
        .iter()
        .filter(|&(_, &v)| v > config.tolerance)
        .map(|(&r, _)| r)
        .collect();
    stats.rounded += selected.len() as u64;

    let mut coverage = Coverage::new(pm, &selected);
    while coverage.total_deficit() > 1e-9 {
        let best = pm
            .matrix
            .row_ids()
            .filter(|r| !selected.contains(r))
            .filter_map(|r| {
                let gain = -coverage.deficit_change(r, 1.0);
                (gain > 1e-9).then(|| (gain / pm.matrix.cost(r).max(1e-12), r))
            })
            .max_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)));
        let Some((_, row)) = best else {
            return Err(SolveError::NoSolution {
                solver: "approx",
                reason: "rounding left a column that no row can repair".to_string(),
            });
        };
        coverage.toggle(row, 1.0);
        selected.insert(row);
        stats.repaired += 1;
    }

    loop {
        let mut order: Vec<RowId> = selected.iter().copied().collect();
        match config.removal_order {
            RemovalOrder::DescendingCost => order.sort_by(|&a, &b| {
                pm.matrix.cost(b).total_cmp(&pm.matrix.cost(a)).then(a.cmp(&b))
            }),
            RemovalOrder::AscendingCost => order.sort_by(|&a, &b| {
                pm.matrix.cost(a).total_cmp(&pm.matrix.cost(b)).then(a.cmp(&b))
            }),
            RemovalOrder::Index => {}
        }
        let mut removed_any = false;
        for row in order {
            if coverage.deficit_change(row, -1.0) <= 1e-9 {
                coverage.toggle(row, -1.0);
                selected.remove(&row);
                stats.removed += 1;
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
    }

    let cost = pm.cost_of(&selected);
    debug!(rows = selected.len(), cost, "rounded LP relaxation");
    Ok((selected, cost))
}

/// Fast relaxation-and-pruning solver over the full problem matrix.
#[derive(Debug)]
pub struct ApproxConsistSolver {
    problem: ConsistProblem,
    config: ApproxConfig,
    stats: ApproxStats,
    soln: Option<Solution>,
}

impl ApproxConsistSolver {
    /// Create a solver with the default configuration.
    pub fn new(problem: ConsistProblem) -> Self {
        Self::with_config(problem, ApproxConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(problem: ConsistProblem, config: ApproxConfig) -> Self {
        Self {
            problem,
            config,
            stats: ApproxStats::default(),
            soln: None,
        }
    }

    /// The problem being solved.
    pub fn problem(&self) -> &ConsistProblem {
        &self.problem
    }

    /// Get statistics.
    pub fn stats(&self) -> &ApproxStats {
        &self.stats
    }
}

impl ConsistencySolver for ApproxConsistSolver {
    fn name(&self) -> &'static str {
        "approx"
    }

    fn solve(&mut self, control: &SolveControl) -> Result<Solution> {
        control.checkpoint()?;
        let pm = self.problem.build_problem_matrix()?;
        control.report(0.5, "rounding LP relaxation");
        let (flips, cost) = approx_cover(&pm, &self.config, &mut self.stats)?;
        control.report(1.0, "rounded");
        info!(flips = flips.len(), cost, "approx solve finished");
        let solution = Solution::new(flips, cost, SolutionStatus::Heuristic);
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

    #[test]
    fn test_approx_fixture_consistent() {
        let mut solver = ApproxConsistSolver::new(fixture());
        let solution = solver.solve(&SolveControl::new()).unwrap();
        assert!(!solution.is_optimal());
        assert!(solver.problem().is_consistent_with(&solution.flips).unwrap());
        assert!(solution.cost >= 4f64.ln());
        assert_eq!(solver.cost(), Some(solution.cost));
    }

    #[test]
    fn test_removal_orders_stay_feasible() {
        let mut problem = fixture();
        let pm = problem.build_problem_matrix().unwrap();
        for order in [
            RemovalOrder::DescendingCost,
            RemovalOrder::AscendingCost,
            RemovalOrder::Index,
        ] {
            let config = ApproxConfig {
                removal_order: order,
                ..Default::default()
            };
            let (rows, cost) = approx_cover(&pm, &config, &mut ApproxStats::default()).unwrap();
            assert!(pm.is_feasible(&rows));
            assert!((pm.cost_of(&rows) - cost).abs() < 1e-12);
        }
    }
}
