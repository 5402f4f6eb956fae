//! Simplex Solver for Covering LPs.
//!
//! Solves the LP relaxation
//!
//! ```text
//! minimize   Σ_r cost_r · x_r
//! subject to Σ_r A[r][c] · x_r ≥ d_c      for every column c ≠ 0
//!            x_r ≥ 0
//! ```
//!
//! where `cost_r` lives in column [`COST_COL`] of the matrix and `d_c` is the
//! column demand (1 unless given). Costs are non-negative, so the dual
//!
//! ```text
//! maximize   Σ_c d_c · y_c
//! subject to Σ_c A[r][c] · y_c ≤ cost_r   for every row r
//!            y_c ≥ 0
//! ```
//!
//! starts from a feasible slack basis and no phase 1 is needed. One slack
//! column is added per matrix row; at optimality the objective-row entry of
//! a row's slack is that row's primal value `x_r`.
//!
//! ## Pivoting
//!
//! - Entering column: most negative objective entry; ties go to the smallest
//!   column sum, then the smallest index. After a run of degenerate pivots
//!   the solver switches to Bland's rule until a pivot makes progress.
//! - Leaving row: minimum positive ratio `rhs / entry`; ties go to the row
//!   whose basic variable has the smallest index.
//!
//! ## References
//!
//! - Chvátal (1983): "Linear Programming", chapters 2-3
//! - Bland (1977): "New finite pivoting rules for the simplex method"

use super::sparse::{COST_COL, ColId, RowId, SparseMatrix};
use crate::error::{MathError, Result};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::trace;

/// Tableau row holding the objective.
const OBJECTIVE_ROW: RowId = RowId::MAX;

/// Configuration for the simplex solver.
#[derive(Debug, Clone)]
pub struct SimplexConfig {
    /// Maximum number of pivots.
    pub max_iterations: usize,
    /// Consecutive degenerate pivots before switching to Bland's rule.
    pub degenerate_streak: usize,
    /// Numerical tolerance for sign tests.
    pub tolerance: f64,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            degenerate_streak: 16,
            tolerance: 1e-9,
        }
    }
}

/// Statistics for the simplex solver.
#[derive(Debug, Clone, Default)]
pub struct SimplexStats {
    /// Number of solves.
    pub solves: u64,
    /// Total pivots.
    pub pivots: u64,
    /// Pivots with a zero step length.
    pub degenerate_pivots: u64,
    /// Pivots chosen by Bland's rule.
    pub bland_pivots: u64,
}

/// Simplex solver for covering LPs encoded in a [`SparseMatrix`].
#[derive(Debug, Default)]
pub struct Simplex {
    config: SimplexConfig,
    stats: SimplexStats,
    soln: BTreeMap<RowId, f64>,
    cost: f64,
}

impl Simplex {
    /// Create a solver with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SimplexConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(config: SimplexConfig) -> Self {
        Self {
            config,
            stats: SimplexStats::default(),
            soln: BTreeMap::new(),
            cost: 0.0,
        }
    }

    /// Solve with demand 1 on every column (plain set cover).
    pub fn simplex_solve(&mut self, matrix: &SparseMatrix) -> Result<f64> {
        self.simplex_solve_with(matrix, &FxHashMap::default())
    }

    /// Solve with explicit column demands; columns missing from `demand`
    /// default to 1.
    ///
    /// Returns the optimal objective value. The per-row values are available
    /// through [`Simplex::soln`] afterwards.
    pub fn simplex_solve_with(
        &mut self,
        matrix: &SparseMatrix,
        demand: &FxHashMap<ColId, f64>,
    ) -> Result<f64> {
        self.stats.solves += 1;
        self.soln.clear();
        self.cost = 0.0;

        let rows: Vec<RowId> = matrix.row_ids().collect();
        let slack_base = matrix.constraint_cols().last().map_or(1, |c| c + 1);

        let mut tableau = SparseMatrix::new();
        let mut basis: FxHashMap<RowId, ColId> = FxHashMap::default();
        for (k, &row) in rows.iter().enumerate() {
            for (col, v) in matrix.row(row) {
                tableau.set_elem_val(row, col, v);
            }
            tableau.set_elem_val(row, slack_base + k, 1.0);
            basis.insert(row, slack_base + k);
        }
        for col in matrix.constraint_cols() {
            let d = demand.get(&col).copied().unwrap_or(1.0);
            tableau.set_elem_val(OBJECTIVE_ROW, col, -d);
        }

        let tol = self.config.tolerance;
        let mut degenerate = 0usize;
        let mut iterations = 0usize;
        loop {
            let bland = degenerate >= self.config.degenerate_streak;
            let Some(entering) = self.entering_column(&tableau, bland) else {
                break;
            };
            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(MathError::IterationLimit(self.config.max_iterations));
            }

            let (pivot_row, ratio) = min_pos_ratio_idx(&tableau, &basis, entering, tol)
                .ok_or(MathError::NoPivotRow { col: entering })?;
            if ratio <= tol {
                degenerate += 1;
                self.stats.degenerate_pivots += 1;
            } else {
                degenerate = 0;
            }
            if bland {
                self.stats.bland_pivots += 1;
            }

            pivot(&mut tableau, pivot_row, entering)?;
            basis.insert(pivot_row, entering);
            self.stats.pivots += 1;
        }

        self.cost = tableau.elem_val(OBJECTIVE_ROW, COST_COL);
        for (k, &row) in rows.iter().enumerate() {
            let x = tableau.elem_val(OBJECTIVE_ROW, slack_base + k);
            if x > tol {
                self.soln.insert(row, x);
            }
        }
        trace!(
            rows = rows.len(),
            iterations,
            cost = self.cost,
            "simplex solved"
        );
        Ok(self.cost)
    }

    /// Solved value per row; rows absent from the map are 0.
    pub fn soln(&self) -> &BTreeMap<RowId, f64> {
        &self.soln
    }

    /// Solved value of one row.
    pub fn value(&self, row: RowId) -> f64 {
        self.soln.get(&row).copied().unwrap_or(0.0)
    }

    /// Objective value of the last solve.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Get statistics.
    pub fn stats(&self) -> &SimplexStats {
        &self.stats
    }

    fn entering_column(&self, tableau: &SparseMatrix, bland: bool) -> Option<ColId> {
        let tol = self.config.tolerance;
        if bland {
            return tableau
                .row(OBJECTIVE_ROW)
                .into_iter()
                .find(|&(c, v)| c != COST_COL && v < -tol)
                .map(|(c, _)| c);
        }
        let (min, ties) = tableau.find_min_row_idx(OBJECTIVE_ROW)?;
        if min >= -tol {
            return None;
        }
        ties.into_iter()
            .map(|c| (objective_free_col_sum(tableau, c), c))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, c)| c)
    }
}

/// Minimum positive ratio of the rhs column over the entering column.
///
/// Returns the pivot row and the ratio. Ties go to the row whose basic
/// variable has the smallest index.
pub fn min_pos_ratio_idx(
    tableau: &SparseMatrix,
    basis: &FxHashMap<RowId, ColId>,
    col: ColId,
    tol: f64,
) -> Option<(RowId, f64)> {
    let mut best: Option<(RowId, f64, ColId)> = None;
    for &row in tableau.col_indices(col)? {
        if row == OBJECTIVE_ROW {
            continue;
        }
        let a = tableau.elem_val(row, col);
        if a <= tol {
            continue;
        }
        let ratio = tableau.elem_val(row, COST_COL).max(0.0) / a;
        let basic = basis.get(&row).copied().unwrap_or(ColId::MAX);
        let better = match best {
            None => true,
            Some((_, r, b)) => ratio < r - tol || ((ratio - r).abs() <= tol && basic < b),
        };
        if better {
            best = Some((row, ratio, basic));
        }
    }
    best.map(|(row, ratio, _)| (row, ratio))
}

/// Check `Σ_r A[r][c] · x_r ≥ d_c - tol` for every constraint column.
pub fn is_covered(
    matrix: &SparseMatrix,
    demand: &FxHashMap<ColId, f64>,
    x: &BTreeMap<RowId, f64>,
    tol: f64,
) -> bool {
    matrix.constraint_cols().all(|col| {
        let d = demand.get(&col).copied().unwrap_or(1.0);
        let lhs: f64 = matrix
            .column(col)
            .into_iter()
            .map(|(row, a)| a * x.get(&row).copied().unwrap_or(0.0))
            .sum();
        lhs >= d - tol
    })
}

fn objective_free_col_sum(tableau: &SparseMatrix, col: ColId) -> f64 {
    tableau.col_sum(col) - tableau.elem_val(OBJECTIVE_ROW, col)
}

fn pivot(tableau: &mut SparseMatrix, pivot_row: RowId, col: ColId) -> Result<()> {
    let a = tableau.elem_val(pivot_row, col);
    tableau.divide_row_by(pivot_row, a)?;
    let others: Vec<(RowId, f64)> = tableau
        .column(col)
        .into_iter()
        .filter(|&(r, _)| r != pivot_row)
        .collect();
    for (row, factor) in others {
        tableau.subtract_row_from_row(pivot_row, factor, row)?;
        tableau.remove_elem(row, col);
    }
    Ok(())
}
