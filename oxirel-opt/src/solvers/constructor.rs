//! Node-by-Node Model Construction.
//!
//! Elements are introduced one at a time in a configurable order. A ground
//! clause becomes active once every element its edges touch has been
//! introduced. Whenever an active clause is violated the search branches on
//! how to satisfy it (conclusion branching): branch `i` flips the edge of
//! literal `i` and locks it, and locks the edges of the literals before `i`
//! at their current (false) value, so the branches are disjoint and no edge
//! is ever flipped twice.
//!
//! Greedy search dives into the cheapest child first and returns the first
//! consistent model. A* orders states by `g + h`, where `g` is the cost of
//! the flips so far and `h` is, over the violated active clauses, the largest
//! cheapest unlocked repair. `h` never overestimates, so the first goal
//! popped is optimal.
//!
//! ## References
//!
//! - Hart, Nilsson & Raphael (1968): "A Formal Basis for the Heuristic
//!   Determination of Minimum Cost Paths"

use crate::error::{Result, SolveError};
use crate::problem::ConsistProblem;
use crate::process::SolveControl;
use crate::solution::{ConsistencySolver, Solution, SolutionStatus};
use oxirel_logic::{EdgeId, ElementId, GroundClause, Model};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use tracing::{debug, info};

/// Order in which elements are introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOrder {
    /// Highest degree first.
    #[default]
    MostLinked,
    /// Lowest degree first.
    LeastLinked,
    /// Highest eigenvector centrality first.
    Eigenvector,
}

/// Search strategy over construction states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Depth-first, cheapest child first; first goal wins.
    Greedy,
    /// Best-first on `g + h`; optimal.
    #[default]
    AStar,
}

/// Configuration for the constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructorConfig {
    /// Element order.
    pub node_order: NodeOrder,
    /// Search strategy.
    pub search: SearchStrategy,
    /// Maximum states expanded.
    pub max_states: usize,
    /// Power iterations for eigenvector ordering.
    pub power_iterations: usize,
}

impl Default for ConstructorConfig {
    fn default() -> Self {
        Self {
            node_order: NodeOrder::MostLinked,
            search: SearchStrategy::AStar,
            max_states: 100_000,
            power_iterations: 50,
        }
    }
}

/// Statistics for the constructor.
#[derive(Debug, Clone, Default)]
pub struct ConstructorStats {
    /// States expanded.
    pub expanded: u64,
    /// States generated.
    pub generated: u64,
    /// States with a violated clause and no unlocked literal.
    pub dead_ends: u64,
}

/// Introduction order of the elements of `model`.
pub fn node_order(model: &Model, order: NodeOrder, power_iterations: usize) -> Vec<ElementId> {
    let n = model.n();
    let mut adjacency = vec![BTreeSet::new(); n];
    for graph in model.graphs() {
        for (i, j) in graph.links() {
            if i != j {
                adjacency[i].insert(j);
                adjacency[j].insert(i);
            }
        }
    }
    let mut elements: Vec<ElementId> = (0..n).collect();
    match order {
        NodeOrder::MostLinked => {
            elements.sort_by_key(|&e| (std::cmp::Reverse(adjacency[e].len()), e));
        }
        NodeOrder::LeastLinked => elements.sort_by_key(|&e| (adjacency[e].len(), e)),
        NodeOrder::Eigenvector => {
            let mut v = vec![1.0f64; n];
            for _ in 0..power_iterations {
                // Shifted by the identity so bipartite graphs still converge.
                let mut w: Vec<f64> = (0..n)
                    .map(|i| v[i] + adjacency[i].iter().map(|&j| v[j]).sum::<f64>())
                    .collect();
                let max = w.iter().copied().fold(0.0, f64::max);
                if max > 0.0 {
                    w.iter_mut().for_each(|x| *x /= max);
                }
                v = w;
            }
            elements.sort_by(|&a, &b| v[b].total_cmp(&v[a]).then(a.cmp(&b)));
        }
    }
    elements
}

/// Clause literal with its truth value in the base model.
#[derive(Debug, Clone, Copy)]
struct Lit {
    edge: EdgeId,
    positive: bool,
    base: bool,
}

#[derive(Debug, Clone)]
struct Active {
    level: usize,
    lits: Vec<Lit>,
}

#[derive(Debug, Clone)]
struct State {
    level: usize,
    flips: BTreeSet<EdgeId>,
    locked: BTreeSet<EdgeId>,
    g: f64,
    h: f64,
}

impl State {
    fn holds(&self, lit: &Lit) -> bool {
        (lit.base != self.flips.contains(&lit.edge)) == lit.positive
    }

    fn f(&self) -> f64 {
        self.g + self.h
    }
}

/// Heap entry: smallest `f` first, then deepest, then oldest.
struct Queued {
    seq: u64,
    state: State,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .state
            .f()
            .total_cmp(&self.state.f())
            .then(self.state.level.cmp(&other.state.level))
            .then(other.seq.cmp(&self.seq))
    }
}

/// Incremental constructor with greedy or A* search.
#[derive(Debug)]
pub struct Constructor {
    problem: ConsistProblem,
    config: ConstructorConfig,
    stats: ConstructorStats,
    soln: Option<Solution>,
}

impl Constructor {
    /// Create a solver with the default configuration.
    pub fn new(problem: ConsistProblem) -> Self {
        Self::with_config(problem, ConstructorConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(problem: ConsistProblem, config: ConstructorConfig) -> Self {
        Self {
            problem,
            config,
            stats: ConstructorStats::default(),
            soln: None,
        }
    }

    /// The problem being solved.
    pub fn problem(&self) -> &ConsistProblem {
        &self.problem
    }

    /// Get statistics.
    pub fn stats(&self) -> &ConstructorStats {
        &self.stats
    }

    fn activate(&self, clauses: &[GroundClause], order: &[ElementId]) -> Vec<Active> {
        let base = self.problem.base();
        let mut position = vec![0usize; order.len()];
        for (k, &e) in order.iter().enumerate() {
            position[e] = k;
        }
        let mut active: Vec<Active> = clauses
            .iter()
            .map(|clause| {
                let level = clause
                    .lits
                    .iter()
                    .map(|l| {
                        let (_, i, j) = base.edge(l.edge);
                        position[i].max(position[j])
                    })
                    .max()
                    .unwrap_or(0);
                let lits = clause
                    .lits
                    .iter()
                    .map(|l| Lit {
                        edge: l.edge,
                        positive: l.positive,
                        base: base.is_connected_id(l.edge),
                    })
                    .collect();
                Active { level, lits }
            })
            .collect();
        active.sort_by_key(|a| a.level);
        active
    }

    /// Cheapest unlocked repair of a violated clause, if any.
    fn cheapest_repair(&self, state: &State, clause: &Active) -> Option<f64> {
        clause
            .lits
            .iter()
            .filter(|l| !state.locked.contains(&l.edge))
            .map(|l| self.problem.edge_cost(l.edge))
            .min_by(f64::total_cmp)
    }

    /// Advance `state` past levels without violated clauses and fill in `h`.
    /// Returns the index of the first violated active clause, or `None` for
    /// a goal. `Err(())` marks a dead end.
    fn settle(
        &self,
        state: &mut State,
        active: &[Active],
        n: usize,
    ) -> std::result::Result<Option<usize>, ()> {
        loop {
            let violated: Vec<usize> = active
                .iter()
                .enumerate()
                .take_while(|(_, c)| c.level <= state.level)
                .filter(|(_, c)| !c.lits.iter().any(|l| state.holds(l)))
                .map(|(k, _)| k)
                .collect();
            if let Some(&first) = violated.first() {
                let mut h: f64 = 0.0;
                for &k in &violated {
                    let repair = self.cheapest_repair(state, &active[k]).ok_or(())?;
                    h = h.max(repair);
                }
                state.h = h;
                return Ok(Some(first));
            }
            if state.level + 1 >= n {
                state.h = 0.0;
                return Ok(None);
            }
            state.level += 1;
        }
    }

    fn children(
        &mut self,
        state: &State,
        clause: &Active,
        active: &[Active],
        n: usize,
    ) -> Vec<State> {
        let mut out = Vec::new();
        for (i, lit) in clause.lits.iter().enumerate() {
            if state.locked.contains(&lit.edge) {
                continue;
            }
            let mut child = state.clone();
            child.flips.insert(lit.edge);
            child.locked.insert(lit.edge);
            child.locked.extend(clause.lits[..i].iter().map(|l| l.edge));
            child.g += self.problem.edge_cost(lit.edge);
            match self.settle(&mut child, active, n) {
                Ok(_) => {
                    self.stats.generated += 1;
                    out.push(child);
                }
                Err(()) => self.stats.dead_ends += 1,
            }
        }
        out
    }

    fn search(
        &mut self,
        active: &[Active],
        n: usize,
        control: &SolveControl,
    ) -> Result<Option<State>> {
        let mut root = State {
            level: 0,
            flips: BTreeSet::new(),
            locked: BTreeSet::new(),
            g: 0.0,
            h: 0.0,
        };
        if self.settle(&mut root, active, n).is_err() {
            return Ok(None);
        }
        let strategy = self.config.search;
        let mut seq = 0u64;
        let mut heap = BinaryHeap::new();
        let mut stack = Vec::new();
        match strategy {
            SearchStrategy::AStar => heap.push(Queued { seq, state: root }),
            SearchStrategy::Greedy => stack.push(root),
        }

        loop {
            control.checkpoint()?;
            let next = match strategy {
                SearchStrategy::AStar => heap.pop().map(|q| q.state),
                SearchStrategy::Greedy => stack.pop(),
            };
            let Some(mut state) = next else {
                return Ok(None);
            };
            let Ok(violated) = self.settle(&mut state, active, n) else {
                self.stats.dead_ends += 1;
                continue;
            };
            let Some(k) = violated else {
                return Ok(Some(state));
            };
            if self.stats.expanded as usize >= self.config.max_states {
                return Err(SolveError::NoSolution {
                    solver: "constructor",
                    reason: format!("state limit {} reached", self.config.max_states),
                });
            }
            self.stats.expanded += 1;
            control.report(state.level as f64 / n.max(1) as f64, "constructing");

            let mut children = self.children(&state, &active[k], active, n);
            match strategy {
                SearchStrategy::AStar => {
                    for child in children {
                        seq += 1;
                        heap.push(Queued { seq, state: child });
                    }
                }
                SearchStrategy::Greedy => {
                    children.sort_by(|a, b| b.f().total_cmp(&a.f()));
                    stack.extend(children);
                }
            }
        }
    }
}

impl ConsistencySolver for Constructor {
    fn name(&self) -> &'static str {
        "constructor"
    }

    fn solve(&mut self, control: &SolveControl) -> Result<Solution> {
        let clauses = self.problem.ground()?;
        if clauses.iter().any(|c| c.lits.is_empty()) {
            return Err(SolveError::Infeasible);
        }
        let n = self.problem.model().n();
        let order = node_order(
            self.problem.base(),
            self.config.node_order,
            self.config.power_iterations,
        );
        debug!(?order, clauses = clauses.len(), "constructing");
        let active = self.activate(&clauses, &order);

        let Some(goal) = self.search(&active, n, control)? else {
            return Err(SolveError::NoSolution {
                solver: "constructor",
                reason: "search space exhausted".to_string(),
            });
        };
        let status = match self.config.search {
            SearchStrategy::AStar => SolutionStatus::Optimal,
            SearchStrategy::Greedy => SolutionStatus::Heuristic,
        };
        let cost = self.problem.cost_of(&goal.flips);
        info!(
            flips = goal.flips.len(),
            cost,
            expanded = self.stats.expanded,
            "construction finished"
        );
        let solution = Solution::new(goal.flips, cost, status);
        self.soln = Some(solution.clone());
        Ok(solution)
    }

    fn soln(&self) -> Option<&Solution> {
        self.soln.as_ref()
    }
}
