//! Greedy Clustering for Equivalence-Like Relations.
//!
//! Treats one probability relation as a partition of the elements: pairs in
//! the same cluster are connected in both directions, pairs in different
//! clusters are disconnected. Joining `i` and `j` costs the flips of the
//! disconnected directions, separating them costs the flips of the connected
//! ones. Elements are placed in index order into the cluster with the most
//! negative join delta, or into a new cluster when no join helps.
//!
//! The result is a partition and therefore satisfies reflexivity, symmetry
//! and transitivity by construction. It is checked against the full logic
//! before it is returned.

use crate::error::{Result, SolveError};
use crate::problem::ConsistProblem;
use crate::process::SolveControl;
use crate::solution::{ConsistencySolver, Solution, SolutionStatus};
use oxirel_logic::{EdgeId, ElementId, EquivalenceGraph, RelationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Join and separation costs of every element pair of one relation.
#[derive(Debug, Clone)]
pub(crate) struct PairCosts {
    n: usize,
    relation: RelationId,
    together: Vec<f64>,
    apart: Vec<f64>,
}

impl PairCosts {
    pub(crate) fn new(problem: &ConsistProblem, relation: RelationId) -> Self {
        let n = problem.model().n();
        let mut together = vec![0.0; n * n];
        let mut apart = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let (mut t, mut a) = (0.0, 0.0);
                for (x, y) in [(i, j), (j, i)] {
                    let edge = problem.model().id(relation, x, y);
                    let cost = problem.edge_cost(edge);
                    if problem.base().is_connected_id(edge) {
                        a += cost;
                    } else {
                        t += cost;
                    }
                }
                together[i * n + j] = t;
                together[j * n + i] = t;
                apart[i * n + j] = a;
                apart[j * n + i] = a;
            }
        }
        Self {
            n,
            relation,
            together,
            apart,
        }
    }

    pub(crate) fn n(&self) -> usize {
        self.n
    }

    /// Cost of putting `i` and `j` in the same cluster.
    pub(crate) fn together(&self, i: ElementId, j: ElementId) -> f64 {
        self.together[i * self.n + j]
    }

    /// Cost of putting `i` and `j` in different clusters.
    pub(crate) fn apart(&self, i: ElementId, j: ElementId) -> f64 {
        self.apart[i * self.n + j]
    }

    /// Cost of the partition described by `labels`.
    pub(crate) fn partition_cost(&self, labels: &[usize]) -> f64 {
        let mut cost = 0.0;
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                cost += if labels[i] == labels[j] {
                    self.together(i, j)
                } else {
                    self.apart(i, j)
                };
            }
        }
        cost
    }

    /// Edges whose value under `labels` differs from the base model.
    pub(crate) fn flips(&self, problem: &ConsistProblem, labels: &[usize]) -> BTreeSet<EdgeId> {
        let mut flips = BTreeSet::new();
        for i in 0..self.n {
            for j in 0..self.n {
                if i == j {
                    continue;
                }
                let edge = problem.model().id(self.relation, i, j);
                if (labels[i] == labels[j]) != problem.base().is_connected_id(edge) {
                    flips.insert(edge);
                }
            }
        }
        flips
    }
}

/// Relation a clustering solver works on: `name` if given, otherwise the
/// first probability graph of the model.
pub(crate) fn clustered_relation(
    problem: &ConsistProblem,
    name: Option<&str>,
) -> Result<RelationId> {
    let model = problem.model();
    let found = match name {
        Some(name) => model.relation_id(name),
        None => (0..model.num_relations())
            .find(|&r| model.graph_by_id(r).is_some_and(|g| g.as_probability().is_some())),
    };
    let Some(relation) = found else {
        return Err(SolveError::Config(match name {
            Some(name) => format!("unknown relation '{name}'"),
            None => "model has no probability graph".to_string(),
        }));
    };
    if model
        .graph_by_id(relation)
        .and_then(|g| g.as_probability())
        .is_none()
    {
        return Err(SolveError::Config(format!(
            "relation '{}' is not a probability graph",
            model.relation_name(relation).unwrap_or("?")
        )));
    }
    Ok(relation)
}

/// Cluster labels in index order from the greedy join rule.
pub(crate) fn greedy_labels(costs: &PairCosts) -> Vec<usize> {
    let mut labels = Vec::with_capacity(costs.n());
    let mut clusters: Vec<Vec<ElementId>> = Vec::new();
    for e in 0..costs.n() {
        let best = clusters
            .iter()
            .enumerate()
            .map(|(k, members)| {
                let delta: f64 = members
                    .iter()
                    .map(|&m| costs.together(e, m) - costs.apart(e, m))
                    .sum();
                (delta, k)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let label = match best {
            Some((delta, k)) if delta < 0.0 => k,
            _ => {
                clusters.push(Vec::new());
                clusters.len() - 1
            }
        };
        clusters[label].push(e);
        labels.push(label);
    }
    labels
}

/// Classes of a label vector, in order of first occurrence.
pub(crate) fn classes_of(labels: &[usize]) -> Vec<Vec<ElementId>> {
    let mut classes: Vec<Vec<ElementId>> = Vec::new();
    for (e, &label) in labels.iter().enumerate() {
        if label >= classes.len() {
            classes.resize_with(label + 1, Vec::new);
        }
        classes[label].push(e);
    }
    classes.retain(|c| !c.is_empty());
    classes
}

/// Build a solution from a partition, rejecting it when the logic does not
/// accept the resulting model.
pub(crate) fn partition_solution(
    problem: &ConsistProblem,
    costs: &PairCosts,
    labels: &[usize],
    solver: &'static str,
) -> Result<(Solution, EquivalenceGraph)> {
    let flips = costs.flips(problem, labels);
    if !problem.is_consistent_with(&flips)? {
        return Err(SolveError::NoSolution {
            solver,
            reason: "partition of the clustered relation violates other rules".to_string(),
        });
    }
    let cost = problem.cost_of(&flips);
    let partition = EquivalenceGraph::from_classes(costs.n(), &classes_of(labels));
    Ok((
        Solution::new(flips, cost, SolutionStatus::Heuristic),
        partition,
    ))
}

/// Configuration for greedy clustering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedySetsConfig {
    /// Relation to cluster; the first probability graph when unset.
    pub relation: Option<String>,
}

/// Greedy clustering solver.
#[derive(Debug)]
pub struct GreedySets {
    problem: ConsistProblem,
    config: GreedySetsConfig,
    partition: Option<EquivalenceGraph>,
    soln: Option<Solution>,
}

impl GreedySets {
    /// Create a solver with the default configuration.
    pub fn new(problem: ConsistProblem) -> Self {
        Self::with_config(problem, GreedySetsConfig::default())
    }

    /// Create a solver with a custom configuration.
    pub fn with_config(problem: ConsistProblem, config: GreedySetsConfig) -> Self {
        Self {
            problem,
            config,
            partition: None,
            soln: None,
        }
    }

    /// The problem being solved.
    pub fn problem(&self) -> &ConsistProblem {
        &self.problem
    }

    /// Partition found by the last solve.
    pub fn partition(&self) -> Option<&EquivalenceGraph> {
        self.partition.as_ref()
    }
}

impl ConsistencySolver for GreedySets {
    fn name(&self) -> &'static str {
        "greedy_sets"
    }

    fn solve(&mut self, control: &SolveControl) -> Result<Solution> {
        control.checkpoint()?;
        let relation = clustered_relation(&self.problem, self.config.relation.as_deref())?;
        let costs = PairCosts::new(&self.problem, relation);
        let labels = greedy_labels(&costs);
        debug!(
            clusters = classes_of(&labels).len(),
            cost = costs.partition_cost(&labels),
            "greedy partition"
        );
        let (solution, partition) =
            partition_solution(&self.problem, &costs, &labels, "greedy_sets")?;
        control.report(1.0, "clustered");
        info!(flips = solution.len(), cost = solution.cost, "greedy clustering finished");
        self.partition = Some(partition);
        self.soln = Some(solution.clone());
        Ok(solution)
    }

    fn soln(&self) -> Option<&Solution> {
        self.soln.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use oxirel_logic::{Logic, Model};

    /// Synonymy over four words: 0~1 and 2~3 are likely, 1~2 is a weak
    /// false positive.
    pub(crate) fn synonym_problem() -> ConsistProblem {
        let mut model = Model::new(4);
        let g = model.add_probability_graph("syn");
        g.set_base_val(0.02);
        g.set_reflexive(true);
        for (i, j, p) in [(0, 1, 0.95), (2, 3, 0.9), (1, 2, 0.6)] {
            g.set_val(i, j, p);
            g.set_val(j, i, p);
        }
        let logic = Logic::parse(
            "syn(1,2) -> syn(2,1)\n\
             syn(1,2); syn(2,3) -> syn(1,3)",
        )
        .unwrap();
        ConsistProblem::new(logic, model).unwrap()
    }

    #[test]
    fn test_pair_costs_split_by_base() {
        let problem = synonym_problem();
        let costs = PairCosts::new(&problem, 0);
        assert_eq!(costs.apart(0, 2), 0.0);
        assert!(costs.together(0, 2) > 0.0);
        assert_eq!(costs.together(0, 1), 0.0);
        assert!(costs.apart(0, 1) > 0.0);
        assert_eq!(costs.together(1, 2), costs.together(2, 1));
    }

    #[test]
    fn test_greedy_labels_split_weak_link() {
        let problem = synonym_problem();
        let costs = PairCosts::new(&problem, 0);
        let labels = greedy_labels(&costs);
        assert_eq!(classes_of(&labels), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_greedy_sets_consistent_partition() {
        let mut solver = GreedySets::new(synonym_problem());
        let solution = solver.solve(&SolveControl::new()).unwrap();
        let m = solver.problem().model().clone();
        let expected: BTreeSet<EdgeId> = [m.id(0, 1, 2), m.id(0, 2, 1)].into();
        assert_eq!(solution.flips, expected);
        assert!(solver.problem().is_consistent_with(&solution.flips).unwrap());
        let partition = solver.partition().unwrap();
        assert!(partition.is_connected(2, 3));
        assert!(!partition.is_connected(1, 2));
    }

    #[test]
    fn test_unknown_relation_is_config_error() {
        let config = GreedySetsConfig {
            relation: Some("hyp".to_string()),
        };
        let mut solver = GreedySets::with_config(synonym_problem(), config);
        assert!(matches!(
            solver.solve(&SolveControl::new()),
            Err(SolveError::Config(_))
        ));
    }
}
