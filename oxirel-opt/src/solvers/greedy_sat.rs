//! Greedy Local Search over Ground Clauses.
//!
//! Keeps, for every ground clause, the number of its literals true in the
//! current candidate. Flipping edge `e` makes every violated clause that
//! mentions `e` and breaks every clause whose only true literal sits on `e`,
//! so both counts follow from the per-clause true counts and stay exact under
//! any flip sequence.
//!
//! Each step flips the edge with the best `(make - break) / cost` among the
//! edges of violated clauses. When none of them improves (the local frontier
//! is exhausted), multi-pass mode recomputes every count from scratch and
//! scans all edges, including undoing earlier flips; single-pass mode gives
//! up. Once the candidate is consistent, flips that no clause depends on are
//! undone.
//!
//! ## References
//!
//! - Selman, Levesque & Mitchell (1992): "A New Method for Solving Hard
//!   Satisfiability Problems"

use crate::error::{Result, SolveError};
use crate::problem::ConsistProblem;
use crate::process::SolveControl;
use crate::solution::{ConsistencySolver, Solution, SolutionStatus};
use oxirel_logic::{EdgeId, GroundClause, Model};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use tracing::{debug, info, trace};

/// Configuration for greedy local search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedySatConfig {
    /// Rescan every edge when the frontier holds no improving flip.
    pub multi_pass: bool,
    /// Maximum flips per solve.
    pub max_flips: usize,
    /// Maximum full rescans per solve.
    pub max_passes: usize,
}

impl Default for GreedySatConfig {
    fn default() -> Self {
        Self {
            multi_pass: true,
            max_flips: 100_000,
            max_passes: 1_000,
        }
    }
}

/// Statistics for greedy local search.
#[derive(Debug, Clone, Default)]
pub struct GreedySatStats {
    /// Flips performed by the last solve.
    pub flips: u64,
    /// Full rescans of the last solve.
    pub passes: u64,
    /// Flips undone after reaching consistency in the last solve.
    pub refunds: u64,
}

/// Clause occurrence of an edge: clause index and literal polarity.
type Occurrence = (usize, bool);

/// Searchable state of one solve.
struct LocalSearch<'a> {
    clauses: &'a [GroundClause],
    occurs: FxHashMap<EdgeId, SmallVec<[Occurrence; 8]>>,
    truth: Model,
    counts: Vec<usize>,
    violated: BTreeSet<usize>,
    flips: BTreeSet<EdgeId>,
}

impl<'a> LocalSearch<'a> {
    fn new(clauses: &'a [GroundClause], base: &Model) -> Self {
        let mut occurs: FxHashMap<EdgeId, SmallVec<[Occurrence; 8]>> = FxHashMap::default();
        for (k, clause) in clauses.iter().enumerate() {
            for lit in &clause.lits {
                occurs.entry(lit.edge).or_default().push((k, lit.positive));
            }
        }
        let mut search = Self {
            clauses,
            occurs,
            truth: base.clone(),
            counts: vec![0; clauses.len()],
            violated: BTreeSet::new(),
            flips: BTreeSet::new(),
        };
        search.recount();
        search
    }

    fn recount(&mut self) {
        self.violated.clear();
        for (k, clause) in self.clauses.iter().enumerate() {
            self.counts[k] = clause.true_count(&self.truth);
            if self.counts[k] == 0 {
                self.violated.insert(k);
            }
        }
    }

    /// `(make, break)` of flipping `edge`.
    fn make_break(&self, edge: EdgeId) -> (usize, usize) {
        let holds = self.truth.is_connected_id(edge);
        let (mut make, mut brk) = (0, 0);
        for &(k, positive) in self.occurs.get(&edge).into_iter().flatten() {
            let lit_true = holds == positive;
            if !lit_true && self.counts[k] == 0 {
                make += 1;
            } else if lit_true && self.counts[k] == 1 {
                brk += 1;
            }
        }
        (make, brk)
    }

    fn flip(&mut self, edge: EdgeId) {
        let holds = self.truth.is_connected_id(edge);
        for &(k, positive) in self.occurs.get(&edge).into_iter().flatten() {
            if holds == positive {
                self.counts[k] -= 1;
                if self.counts[k] == 0 {
                    self.violated.insert(k);
                }
            } else {
                if self.counts[k] == 0 {
                    self.violated.remove(&k);
                }
                self.counts[k] += 1;
            }
        }
        self.truth.symm_diff_all(&[edge]);
        if !self.flips.remove(&edge) {
            self.flips.insert(edge);
        }
    }

    fn frontier(&self) -> BTreeSet<EdgeId> {
        self.violated
            .iter()
            .flat_map(|&k| self.clauses[k].lits.iter().map(|l| l.edge))
            .collect()
    }
}

/// Local-search solver.
#[derive(Debug)]
pub struct GreedySat {
    problem: ConsistProblem,
    config: GreedySatConfig,
    stats: GreedySatStats,
    soln: Option<Solution>,
}

impl GreedySat {
    /// Create a solver with the default configuration.
    pub fn new(problem: ConsistProblem) -> Self {
        Self::with_config(problem, GreedySatConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(problem: ConsistProblem, config: GreedySatConfig) -> Self {
        Self {
            problem,
            config,
            stats: GreedySatStats::default(),
            soln: None,
        }
    }

    /// The problem being solved.
    pub fn problem(&self) -> &ConsistProblem {
        &self.problem
    }

    /// Get statistics.
    pub fn stats(&self) -> &GreedySatStats {
        &self.stats
    }

    /// Best improving flip among `candidates`: positive gain per unit cost,
    /// or a refund of an earlier flip that breaks nothing. Every accepted
    /// flip lowers the violated count, or keeps it and lowers the cost, so
    /// the search cannot cycle.
    fn best_flip(
        &self,
        search: &LocalSearch<'_>,
        candidates: impl IntoIterator<Item = EdgeId>,
    ) -> Option<EdgeId> {
        let mut best: Option<(f64, EdgeId)> = None;
        for edge in candidates {
            let (make, brk) = search.make_break(edge);
            let gain = make as f64 - brk as f64;
            let cost = self.problem.edge_cost(edge);
            let score = if search.flips.contains(&edge) {
                if gain < 0.0 || (gain == 0.0 && cost <= 0.0) {
                    continue;
                }
                f64::INFINITY
            } else {
                if gain <= 0.0 {
                    continue;
                }
                gain / cost.max(f64::MIN_POSITIVE)
            };
            if best.is_none_or(|(s, _)| score > s) {
                best = Some((score, edge));
            }
        }
        best.map(|(_, edge)| edge)
    }
}

impl ConsistencySolver for GreedySat {
    fn name(&self) -> &'static str {
        "greedy_sat"
    }

    fn solve(&mut self, control: &SolveControl) -> Result<Solution> {
        let clauses = self.problem.ground()?;
        if clauses.iter().any(|c| c.lits.is_empty()) {
            return Err(SolveError::Infeasible);
        }
        self.stats = GreedySatStats::default();
        let mut search = LocalSearch::new(&clauses, self.problem.base());
        let initial = search.violated.len().max(1);
        let mut passes = 0usize;
        debug!(
            clauses = clauses.len(),
            violated = search.violated.len(),
            "starting local search"
        );

        while !search.violated.is_empty() {
            control.checkpoint()?;
            if self.stats.flips as usize >= self.config.max_flips {
                return Err(SolveError::NoSolution {
                    solver: "greedy_sat",
                    reason: format!("flip limit {} reached", self.config.max_flips),
                });
            }
            let mut choice = self.best_flip(&search, search.frontier());
            if choice.is_none() && self.config.multi_pass && passes < self.config.max_passes {
                passes += 1;
                self.stats.passes += 1;
                search.recount();
                let all: BTreeSet<EdgeId> = search.occurs.keys().copied().collect();
                choice = self.best_flip(&search, all);
            }
            let Some(edge) = choice else {
                return Err(SolveError::NoSolution {
                    solver: "greedy_sat",
                    reason: format!(
                        "local search stalled with {} violated clauses",
                        search.violated.len()
                    ),
                });
            };
            trace!(edge, "flip");
            search.flip(edge);
            self.stats.flips += 1;
            control.report(
                1.0 - search.violated.len() as f64 / initial as f64,
                "local search",
            );
        }

        // Undo flips that nothing depends on, most expensive first.
        let mut flipped: Vec<EdgeId> = search.flips.iter().copied().collect();
        flipped.sort_by(|&a, &b| {
            self.problem
                .edge_cost(b)
                .total_cmp(&self.problem.edge_cost(a))
                .then(a.cmp(&b))
        });
        for edge in flipped {
            if search.make_break(edge).1 == 0 {
                search.flip(edge);
                self.stats.refunds += 1;
            }
        }

        let cost = self.problem.cost_of(&search.flips);
        info!(flips = search.flips.len(), cost, "local search finished");
        let solution = Solution::new(search.flips, cost, SolutionStatus::Heuristic);
        self.soln = Some(solution.clone());
        Ok(solution)
    }

    fn soln(&self) -> Option<&Solution> {
        self.soln.as_ref()
    }
}
