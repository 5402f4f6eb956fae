//! Consistency problems as 0/1 integer programs.
//!
//! Every flippable edge `e` is a 0/1 variable `x_e` meaning "toggle `e`
//! relative to the most likely hard model `S`". Every ground clause is a
//! constraint column. For clause `c`:
//!
//! ```text
//! A[e][c] = +1   if the literal on e is false in S (flipping helps)
//! A[e][c] = -1   if the literal on e is true in S (flipping hurts)
//! d_c     = 1 - #(literals of c true in S)
//!
//! minimize Σ cost_e x_e   subject to   Σ_e A[e][c] x_e ≥ d_c
//! ```
//!
//! Row ids are edge ids, column [`COST_COL`] holds the flip costs and
//! clause columns start at 1. Clauses violated in `S` are pure covering
//! columns (`+1` entries, `d = 1`).
//!
//! Costs are the absolute log-odds of each edge scaled by
//! `1 + perturbation_size * h(e)`, where `h` is a fixed hash into `[0, 1)`.
//! The perturbation breaks exact cost ties so that optima are unique.

use crate::error::Result;
use oxirel_logic::{ClauseLit, EdgeId, GroundClause, GroundScope, Logic, Model};
use oxirel_math::{COST_COL, ColId, RowId, SparseMatrix, is_covered};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Default relative cost perturbation.
pub const PERTURBATION_SIZE: f64 = 1e-4;

/// Deterministic value in `[0, 1)` for `edge`.
#[inline]
pub fn perturbation(edge: EdgeId) -> f64 {
    let h = (edge as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 11;
    h as f64 / (1u64 << 53) as f64
}

/// Configuration for problem construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemConfig {
    /// Relative cost perturbation.
    pub perturbation_size: f64,
    /// Keep only clauses with at most this many true literals when building
    /// the full matrix; `None` keeps every clause (exact).
    pub near_violated: Option<usize>,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            perturbation_size: PERTURBATION_SIZE,
            near_violated: None,
        }
    }
}

impl ProblemConfig {
    /// Grounding scope of the full matrix.
    pub fn scope(&self) -> GroundScope {
        self.near_violated
            .map_or(GroundScope::All, GroundScope::NearViolated)
    }
}

/// Statistics for problem construction.
#[derive(Debug, Clone, Default)]
pub struct ProblemStats {
    /// Matrices built.
    pub matrices_built: u64,
    /// Ground clauses encoded.
    pub clauses_encoded: u64,
    /// Rows removed by dominance.
    pub rows_reduced: u64,
    /// Columns removed by dominance.
    pub cols_reduced: u64,
}

/// Base truth value and cost of one matrix row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Base {
    /// Edge id (= row id).
    pub edge: EdgeId,
    /// Whether the edge holds in the most likely hard model.
    pub connected: bool,
    /// Flip cost.
    pub cost: f64,
}

/// Ground clauses deduplicated by literal set, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ClauseSet {
    clauses: Vec<GroundClause>,
    index: FxHashSet<SmallVec<[ClauseLit; 4]>>,
}

impl ClauseSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `clause` unless its literal set is present.
    pub fn insert(&mut self, clause: GroundClause) -> bool {
        if self.index.insert(clause.lits.clone()) {
            self.clauses.push(clause);
            true
        } else {
            false
        }
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Clauses in insertion order.
    pub fn as_slice(&self) -> &[GroundClause] {
        &self.clauses
    }
}

/// Matrix form of a set of ground clauses.
#[derive(Debug, Clone)]
pub struct ProblemMatrix {
    /// Coefficients, with costs in [`COST_COL`].
    pub matrix: SparseMatrix,
    /// Demand of every clause column.
    pub demand: FxHashMap<ColId, f64>,
    clauses: BTreeMap<ColId, GroundClause>,
    bases: BTreeMap<RowId, Base>,
    next_col: ColId,
}

impl Default for ProblemMatrix {
    fn default() -> Self {
        Self {
            matrix: SparseMatrix::new(),
            demand: FxHashMap::default(),
            clauses: BTreeMap::new(),
            bases: BTreeMap::new(),
            next_col: COST_COL + 1,
        }
    }
}

impl ProblemMatrix {
    /// `(rows, constraint columns)`.
    pub fn complexity(&self) -> (usize, usize) {
        (self.matrix.num_rows(), self.matrix.constraint_cols().count())
    }

    /// Base value and cost of every row, by edge id.
    pub fn bases(&self) -> Vec<Base> {
        self.bases.values().copied().collect()
    }

    /// Clause encoded in column `col`.
    pub fn clause(&self, col: ColId) -> Option<&GroundClause> {
        self.clauses.get(&col)
    }

    /// Demand of column `col`.
    pub fn demand_of(&self, col: ColId) -> f64 {
        self.demand.get(&col).copied().unwrap_or(1.0)
    }

    /// Whether every constraint entry is `+1` and every demand is 1.
    pub fn is_pure_cover(&self) -> bool {
        self.matrix.constraint_cols().all(|col| {
            (self.demand_of(col) - 1.0).abs() < 1e-12
                && self
                    .matrix
                    .column(col)
                    .iter()
                    .all(|&(_, v)| (v - 1.0).abs() < 1e-12)
        })
    }

    /// Whether some clause has no flippable literal left. Such a clause is
    /// violated whatever is flipped and has no column in the matrix.
    pub fn has_empty_clause(&self) -> bool {
        self.clauses.values().any(|c| c.lits.is_empty())
    }

    /// Whether toggling exactly `flips` satisfies every column.
    pub fn is_feasible(&self, flips: &BTreeSet<RowId>) -> bool {
        let x: BTreeMap<RowId, f64> = flips.iter().map(|&r| (r, 1.0)).collect();
        !self.has_empty_clause() && is_covered(&self.matrix, &self.demand, &x, 1e-9)
    }

    /// Total cost of `flips`.
    pub fn cost_of(&self, flips: &BTreeSet<RowId>) -> f64 {
        flips.iter().map(|&r| self.matrix.cost(r)).sum()
    }

    /// Append `clause` as a new column relative to `base`.
    fn push_clause(&mut self, clause: GroundClause, base: &Model, cost: impl Fn(EdgeId) -> f64) {
        let col = self.next_col;
        self.next_col += 1;
        let mut true_count = 0usize;
        for lit in &clause.lits {
            let holds = lit.holds(base);
            if holds {
                true_count += 1;
            }
            self.matrix
                .set_elem_val(lit.edge, col, if holds { -1.0 } else { 1.0 });
            self.bases.entry(lit.edge).or_insert_with(|| {
                let c = cost(lit.edge);
                Base {
                    edge: lit.edge,
                    connected: base.is_connected_id(lit.edge),
                    cost: c,
                }
            });
            if !self.matrix.has_elem(lit.edge, COST_COL) {
                self.matrix.set_elem_val(lit.edge, COST_COL, cost(lit.edge));
            }
        }
        self.demand.insert(col, 1.0 - true_count as f64);
        self.clauses.insert(col, clause);
    }

    /// Remove dominated rows and implied columns of a pure covering matrix.
    ///
    /// Row `r1` is dominated by `r2` when `r2` covers every column `r1`
    /// covers at no greater cost; column `c1` is implied by `c2` when every
    /// row covering `c2` also covers `c1`. Returns `(rows, cols)` removed,
    /// or `(0, 0)` when the matrix is not a pure cover.
    pub fn reduce(&mut self) -> (usize, usize) {
        if !self.is_pure_cover() {
            return (0, 0);
        }
        let (mut rows_removed, mut cols_removed) = (0, 0);
        loop {
            let mut changed = false;

            let rows: Vec<RowId> = self.matrix.row_ids().collect();
            for &r1 in &rows {
                if self.matrix.row_indices(r1).is_none() {
                    continue;
                }
                let dominated = rows.iter().any(|&r2| {
                    r2 != r1
                        && self.matrix.row_indices(r2).is_some()
                        && self.matrix.row_subset(r1, r2)
                        && {
                            let (c1, c2) = (self.matrix.cost(r1), self.matrix.cost(r2));
                            c2 < c1 || (c2 == c1 && r2 < r1)
                        }
                });
                if dominated {
                    self.matrix.remove_row(r1);
                    self.bases.remove(&r1);
                    rows_removed += 1;
                    changed = true;
                }
            }

            let cols: Vec<ColId> = self.matrix.constraint_cols().collect();
            for &c1 in &cols {
                if self.matrix.col_indices(c1).is_none() {
                    continue;
                }
                let implied = cols.iter().any(|&c2| {
                    c2 != c1
                        && self.matrix.col_indices(c2).is_some()
                        && self.matrix.col_subset(c2, c1)
                        && (!self.matrix.col_subset(c1, c2) || c2 < c1)
                });
                if implied {
                    self.matrix.remove_column(c1);
                    self.demand.remove(&c1);
                    self.clauses.remove(&c1);
                    cols_removed += 1;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
        // Rows left without any clause carry only a cost.
        let idle: Vec<RowId> = self
            .matrix
            .row_ids()
            .filter(|&r| {
                self.matrix
                    .row_indices(r)
                    .is_some_and(|s| s.iter().all(|&c| c == COST_COL))
            })
            .collect();
        for r in idle {
            self.matrix.remove_row(r);
            self.bases.remove(&r);
            rows_removed += 1;
        }
        debug!(rows_removed, cols_removed, "reduced covering matrix");
        (rows_removed, cols_removed)
    }
}

/// A logic and a probabilistic model to reconcile.
#[derive(Debug, Clone)]
pub struct ConsistProblem {
    logic: Logic,
    model: Model,
    base: Model,
    config: ProblemConfig,
    stats: ProblemStats,
}

impl ConsistProblem {
    /// Create a problem with the default configuration.
    pub fn new(logic: Logic, model: Model) -> Result<Self> {
        Self::with_config(logic, model, ProblemConfig::default())
    }

    /// Create a problem with a custom configuration.
    pub fn with_config(logic: Logic, model: Model, config: ProblemConfig) -> Result<Self> {
        logic.bind(&model)?;
        let base = model.create_specific_copy();
        Ok(Self {
            logic,
            model,
            base,
            config,
            stats: ProblemStats::default(),
        })
    }

    /// Rules.
    pub fn logic(&self) -> &Logic {
        &self.logic
    }

    /// Probabilistic model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Most likely hard model, the reference point of every solution.
    pub fn base(&self) -> &Model {
        &self.base
    }

    /// Configuration.
    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    /// Get statistics.
    pub fn stats(&self) -> &ProblemStats {
        &self.stats
    }

    /// Perturbed flip cost of `edge`.
    pub fn edge_cost(&self, edge: EdgeId) -> f64 {
        self.model.flip_cost(edge) * (1.0 + self.config.perturbation_size * perturbation(edge))
    }

    /// Total perturbed cost of `flips`.
    pub fn cost_of<'a>(&self, flips: impl IntoIterator<Item = &'a EdgeId>) -> f64 {
        flips.into_iter().map(|&e| self.edge_cost(e)).sum()
    }

    /// Base model with `flips` applied.
    pub fn apply<'a>(&self, flips: impl IntoIterator<Item = &'a EdgeId>) -> Model {
        let mut model = self.base.clone();
        model.symm_diff_all(flips);
        model
    }

    /// Whether the base model with `flips` applied satisfies every rule.
    pub fn is_consistent_with<'a>(&self, flips: impl IntoIterator<Item = &'a EdgeId>) -> Result<bool> {
        Ok(self.logic.is_consistent(&self.apply(flips))?)
    }

    /// Ground clauses over the base model with the configured scope.
    pub fn ground(&self) -> Result<Vec<GroundClause>> {
        Ok(self
            .logic
            .ground_clauses_with(&self.model, &self.base, self.config.scope())?)
    }

    /// Matrix over every ground clause in the configured scope.
    pub fn build_problem_matrix(&mut self) -> Result<ProblemMatrix> {
        let clauses = self.ground()?;
        let mut pm = ProblemMatrix::default();
        self.encode(&mut pm, clauses);
        let (rows, cols) = pm.complexity();
        info!(rows, cols, "built problem matrix");
        Ok(pm)
    }

    /// Add the clauses violated by `candidate` to `seen` and return the
    /// matrix over `seen`, or `None` when `candidate` is consistent.
    pub fn build_growing_problem_matrix(
        &mut self,
        candidate: &Model,
        seen: &mut ClauseSet,
    ) -> Result<Option<ProblemMatrix>> {
        let fresh = self.violated_by(candidate, seen)?;
        if fresh.is_empty() {
            return Ok(None);
        }
        let pm = self.matrix_over(seen);
        let (rows, cols) = pm.complexity();
        debug!(rows, cols, fresh = fresh.len(), "built growing problem matrix");
        Ok(Some(pm))
    }

    /// Matrix over exactly the clauses in `seen`.
    pub fn matrix_over(&mut self, seen: &ClauseSet) -> ProblemMatrix {
        let mut pm = ProblemMatrix::default();
        self.encode(&mut pm, seen.as_slice().to_vec());
        pm
    }

    /// Append the clauses violated by `candidate` that are not yet in `seen`
    /// to `pm` and `seen`. Returns the number of columns added; 0 means
    /// `candidate` is consistent.
    pub fn extend_problem_matrix(
        &mut self,
        pm: &mut ProblemMatrix,
        candidate: &Model,
        seen: &mut ClauseSet,
    ) -> Result<usize> {
        let fresh = self.violated_by(candidate, seen)?;
        let added = fresh.len();
        self.encode(pm, fresh);
        Ok(added)
    }

    /// Clauses violated by `candidate`, inserted into `seen`; returns the
    /// newly inserted ones.
    fn violated_by(&self, candidate: &Model, seen: &mut ClauseSet) -> Result<Vec<GroundClause>> {
        let violated = self.logic.ground_clauses_with(
            &self.model,
            candidate,
            GroundScope::NearViolated(0),
        )?;
        Ok(violated
            .into_iter()
            .filter(|c| seen.insert(c.clone()))
            .collect())
    }

    fn encode(&mut self, pm: &mut ProblemMatrix, clauses: Vec<GroundClause>) {
        self.stats.matrices_built += 1;
        self.stats.clauses_encoded += clauses.len() as u64;
        for clause in clauses {
            pm.push_clause(clause, &self.base, |e| self.edge_cost(e));
        }
    }

    /// Record a reduction in the statistics.
    pub fn note_reduction(&mut self, rows: usize, cols: usize) {
        self.stats.rows_reduced += rows as u64;
        self.stats.cols_reduced += cols as u64;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn fixture_model() -> Model {
        let mut model = Model::new(4);
        let hyp = model.add_probability_graph("hyp");
        hyp.set_base_val(0.02);
        hyp.set_val(0, 1, 0.99);
        hyp.set_val(1, 2, 0.8);
        hyp.set_val(2, 3, 0.99);
        hyp.set_val(0, 2, 0.45);
        hyp.set_val(1, 3, 0.45);
        hyp.set_val(0, 3, 0.01);
        model
    }

    pub(crate) fn fixture() -> ConsistProblem {
        let logic = Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap();
        ConsistProblem::new(logic, fixture_model()).unwrap()
    }

    #[test]
    fn test_perturbation_range() {
        for e in 0..1000 {
            let h = perturbation(e);
            assert!((0.0..1.0).contains(&h));
        }
        assert_ne!(perturbation(1), perturbation(2));
    }

    #[test]
    fn test_edge_cost() {
        let problem = fixture();
        let e12 = problem.model().id(0, 1, 2);
        let c = problem.edge_cost(e12);
        let ln4 = 4f64.ln();
        assert!(c >= ln4 && c <= ln4 * (1.0 + PERTURBATION_SIZE));
    }

    #[test]
    fn test_full_matrix_encoding() {
        let mut problem = fixture();
        let pm = problem.build_problem_matrix().unwrap();
        assert_eq!(pm.complexity(), (12, 24));
        assert!(!pm.is_pure_cover());

        let e = |i, j| problem.model().id(0, i, j);
        // Clause of (0,1,2): !e01 | !e12 | e02, violated in the base model.
        let col = (1..=24)
            .find(|&c| {
                pm.clause(c).is_some_and(|cl| {
                    [e(0, 1), e(0, 2), e(1, 2)]
                        .iter()
                        .all(|&edge| cl.lit_on(edge).is_some())
                })
            })
            .unwrap();
        assert_eq!(pm.demand_of(col), 1.0);
        assert_eq!(pm.matrix.elem_val(e(0, 1), col), 1.0);
        assert_eq!(pm.matrix.elem_val(e(1, 2), col), 1.0);
        assert_eq!(pm.matrix.elem_val(e(0, 2), col), 1.0);

        assert!(pm.is_feasible(&[e(1, 2)].into_iter().collect()));
        assert!(!pm.is_feasible(&[e(0, 2), e(1, 3)].into_iter().collect()));
        assert!(!pm.is_feasible(&BTreeSet::new()));

        let bases = pm.bases();
        assert_eq!(bases.len(), 12);
        assert!(bases.iter().any(|b| b.edge == e(0, 1) && b.connected));
    }

    #[test]
    fn test_growing_matrix() {
        let mut problem = fixture();
        let mut seen = ClauseSet::new();
        let base = problem.base().clone();
        let pm = problem
            .build_growing_problem_matrix(&base, &mut seen)
            .unwrap()
            .unwrap();
        assert_eq!(pm.complexity(), (5, 2));
        assert!(pm.is_pure_cover());

        let model = problem.model().clone();
        let e = |i, j| model.id(0, i, j);
        let candidate = problem.apply(&[e(0, 2), e(1, 3)]);
        let pm = problem
            .build_growing_problem_matrix(&candidate, &mut seen)
            .unwrap()
            .unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(pm.complexity().1, 4);
        assert!(!pm.is_pure_cover());

        let fixed = problem.apply(&[e(1, 2)]);
        assert!(problem.build_growing_problem_matrix(&fixed, &mut seen).unwrap().is_none());
    }

    #[test]
    fn test_reduce_pure_cover() {
        let mut problem = fixture();
        let mut seen = ClauseSet::new();
        let base = problem.base().clone();
        let mut pm = problem
            .build_growing_problem_matrix(&base, &mut seen)
            .unwrap()
            .unwrap();
        // Columns {e01,e02,e12} and {e12,e13,e23}: e12 covers both, every
        // other row covers one column at higher cost than e02 or e13.
        let (rows, cols) = pm.reduce();
        assert_eq!(cols, 0);
        assert_eq!(rows, 2);
        let e = |i, j| problem.model().id(0, i, j);
        let left: Vec<RowId> = pm.matrix.row_ids().collect();
        assert_eq!(left, vec![e(0, 2), e(1, 2), e(1, 3)]);
        assert!(pm.matrix.is_ok());
    }
}
