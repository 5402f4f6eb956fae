//! Relation Graphs.
//!
//! Every relation of a [`Model`](crate::Model) is stored as one [`Graph`]
//! over the term universe `0..n`. The variants differ in what an edge means:
//!
//! - [`ProbabilityGraph`]: per ordered pair a cost of asserting (`pos_val`)
//!   and of denying (`neg_val`) the edge, derived from a probability. An edge
//!   is connected when asserting it is cheaper than denying it.
//! - [`SpecificGraph`]: a hard 0/1 edge set, the shape of every solution.
//! - [`EquivalenceGraph`]: a partition; elements of one class are connected.
//! - [`MembershipGraph`]: overlapping clusters; elements sharing a cluster
//!   are connected.
//!
//! Reflexive pairs `(i, i)` are structurally fixed: they are never
//! [`mutable`](Graph::mutable) and their truth value is the graph's
//! reflexivity flag (always true for clusterings).
//!
//! Call sites pick a variant by matching or through the capability queries
//! [`Graph::as_probability`] / [`Graph::as_specific`].

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Probabilities are clamped into `[MIN_PROBABILITY, 1 - MIN_PROBABILITY]`.
pub const MIN_PROBABILITY: f64 = 1e-9;

/// Prior probability of a pair nothing was observed for.
pub const DEFAULT_BASE_PROBABILITY: f64 = 0.01;

/// Discriminant of a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphKind {
    /// [`ProbabilityGraph`]
    Probability,
    /// [`SpecificGraph`]
    Specific,
    /// [`MembershipGraph`]
    Membership,
    /// [`EquivalenceGraph`]
    Equivalence,
}

fn costs_of(p: f64) -> (f64, f64) {
    let p = p.clamp(MIN_PROBABILITY, 1.0 - MIN_PROBABILITY);
    (-p.ln(), -(1.0 - p).ln())
}

/// Weighted graph of assert/deny costs.
///
/// For a probability `p` the costs are `pos_val = -ln p` and
/// `neg_val = -ln(1 - p)`, so `remove_val = neg_val - pos_val` is the
/// log-odds `ln(p / (1 - p))`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityGraph {
    n: usize,
    reflexive: bool,
    base: (f64, f64),
    values: FxHashMap<(usize, usize), (f64, f64)>,
}

impl ProbabilityGraph {
    /// Create a graph over `n` terms with the default prior.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            reflexive: true,
            base: costs_of(DEFAULT_BASE_PROBABILITY),
            values: FxHashMap::default(),
        }
    }

    /// Universe size.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Set the prior probability of unobserved pairs.
    pub fn set_base_val(&mut self, p: f64) {
        self.base = costs_of(p);
    }

    /// Cost of asserting an unobserved pair.
    pub fn base_pos_val(&self) -> f64 {
        self.base.0
    }

    /// Cost of denying an unobserved pair.
    pub fn base_neg_val(&self) -> f64 {
        self.base.1
    }

    /// Set whether reflexive pairs hold.
    pub fn set_reflexive(&mut self, reflexive: bool) {
        self.reflexive = reflexive;
    }

    /// Whether reflexive pairs hold.
    pub fn is_reflexive(&self) -> bool {
        self.reflexive
    }

    /// Record the probability that `(i, j)` holds.
    pub fn set_val(&mut self, i: usize, j: usize, p: f64) {
        let (pos, neg) = costs_of(p);
        self.set_pos_neg_val(i, j, pos, neg);
    }

    /// Record an explicit asserting cost; denying is free.
    pub fn set_pos_val(&mut self, i: usize, j: usize, pos: f64) {
        self.set_pos_neg_val(i, j, pos, 0.0);
    }

    /// Record explicit asserting and denying costs.
    pub fn set_pos_neg_val(&mut self, i: usize, j: usize, pos: f64, neg: f64) {
        if i < self.n && j < self.n && i != j {
            self.values.insert((i, j), (pos, neg));
        }
    }

    /// Cost of asserting `(i, j)`.
    pub fn pos_val(&self, i: usize, j: usize) -> f64 {
        self.costs(i, j).0
    }

    /// Cost of denying `(i, j)`.
    pub fn neg_val(&self, i: usize, j: usize) -> f64 {
        self.costs(i, j).1
    }

    /// Marginal cost of switching `(i, j)` from denied to asserted.
    pub fn add_val(&self, i: usize, j: usize) -> f64 {
        let (pos, neg) = self.costs(i, j);
        pos - neg
    }

    /// Marginal cost of switching `(i, j)` from asserted to denied.
    pub fn remove_val(&self, i: usize, j: usize) -> f64 {
        let (pos, neg) = self.costs(i, j);
        neg - pos
    }

    /// Probability implied by the stored costs.
    pub fn probability(&self, i: usize, j: usize) -> f64 {
        1.0 / (1.0 + (-self.remove_val(i, j)).exp())
    }

    /// Cost of moving `(i, j)` away from its most likely value.
    pub fn flip_cost(&self, i: usize, j: usize) -> f64 {
        self.remove_val(i, j).abs()
    }

    /// Whether `(i, j)` is more likely present than absent.
    pub fn is_connected(&self, i: usize, j: usize) -> bool {
        if i >= self.n || j >= self.n {
            return false;
        }
        if i == j {
            return self.reflexive;
        }
        let (pos, neg) = self.costs(i, j);
        pos < neg
    }

    /// Pairs with explicitly recorded costs, sorted.
    pub fn observed(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<_> = self.values.keys().copied().collect();
        pairs.sort_unstable();
        pairs
    }

    /// Connected off-diagonal pairs, sorted.
    pub fn links(&self) -> Vec<(usize, usize)> {
        if self.base.0 < self.base.1 {
            (0..self.n)
                .flat_map(|i| (0..self.n).map(move |j| (i, j)))
                .filter(|&(i, j)| i != j && self.is_connected(i, j))
                .collect()
        } else {
            self.observed()
                .into_iter()
                .filter(|&(i, j)| self.is_connected(i, j))
                .collect()
        }
    }

    /// Hard copy of the connected pairs.
    pub fn to_specific(&self) -> SpecificGraph {
        let mut g = SpecificGraph::new(self.n);
        g.set_reflexive(self.reflexive);
        for (i, j) in self.links() {
            g.add(i, j);
        }
        g
    }

    fn costs(&self, i: usize, j: usize) -> (f64, f64) {
        self.values.get(&(i, j)).copied().unwrap_or(self.base)
    }
}

/// Hard 0/1 edge set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecificGraph {
    n: usize,
    reflexive: bool,
    edges: BTreeSet<(usize, usize)>,
}

impl SpecificGraph {
    /// Create an empty graph over `n` terms.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            reflexive: true,
            edges: BTreeSet::new(),
        }
    }

    /// Universe size.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Set whether reflexive pairs hold.
    pub fn set_reflexive(&mut self, reflexive: bool) {
        self.reflexive = reflexive;
    }

    /// Whether reflexive pairs hold.
    pub fn is_reflexive(&self) -> bool {
        self.reflexive
    }

    /// Whether `(i, j)` is an edge.
    pub fn is_connected(&self, i: usize, j: usize) -> bool {
        if i >= self.n || j >= self.n {
            return false;
        }
        i == j && self.reflexive || self.edges.contains(&(i, j))
    }

    /// Insert `(i, j)`. Returns false for reflexive or out-of-range pairs.
    pub fn add(&mut self, i: usize, j: usize) -> bool {
        i != j && i < self.n && j < self.n && self.edges.insert((i, j))
    }

    /// Remove `(i, j)`. Returns whether it was present.
    pub fn remove(&mut self, i: usize, j: usize) -> bool {
        self.edges.remove(&(i, j))
    }

    /// Number of off-diagonal edges.
    pub fn link_count(&self) -> usize {
        self.edges.len()
    }

    /// Off-diagonal edges, sorted.
    pub fn links(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.iter().copied()
    }
}

/// Partition of the universe into classes.
#[derive(Debug, Clone)]
pub struct EquivalenceGraph {
    labels: Vec<usize>,
    next_label: usize,
}

impl EquivalenceGraph {
    /// Every element in its own class.
    pub fn new(n: usize) -> Self {
        Self {
            labels: (0..n).collect(),
            next_label: n,
        }
    }

    /// Build from explicit classes; unlisted elements stay singletons.
    pub fn from_classes(n: usize, classes: &[Vec<usize>]) -> Self {
        let mut g = Self::new(n);
        for class in classes {
            if let Some((&first, rest)) = class.split_first() {
                for &other in rest {
                    g.add(first, other);
                }
            }
        }
        g
    }

    /// Universe size.
    pub fn n(&self) -> usize {
        self.labels.len()
    }

    /// Whether `i` and `j` share a class.
    pub fn is_connected(&self, i: usize, j: usize) -> bool {
        match (self.labels.get(i), self.labels.get(j)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Merge the classes of `i` and `j`. Returns whether anything changed.
    pub fn add(&mut self, i: usize, j: usize) -> bool {
        if i >= self.n() || j >= self.n() || self.is_connected(i, j) {
            return false;
        }
        let (keep, drop) = (self.labels[i], self.labels[j]);
        for label in &mut self.labels {
            if *label == drop {
                *label = keep;
            }
        }
        true
    }

    /// Move `j` out of the class of `i` into a fresh singleton.
    pub fn remove(&mut self, i: usize, j: usize) -> bool {
        if i == j || !self.is_connected(i, j) {
            return false;
        }
        self.labels[j] = self.next_label;
        self.next_label += 1;
        true
    }

    /// Classes as sorted element lists, ordered by smallest member.
    pub fn classes(&self) -> Vec<Vec<usize>> {
        let mut by_label: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for (e, &label) in self.labels.iter().enumerate() {
            by_label.entry(label).or_default().push(e);
        }
        let mut classes: Vec<Vec<usize>> = by_label.into_values().collect();
        classes.sort_unstable();
        classes
    }

    /// Number of connected off-diagonal ordered pairs.
    pub fn link_count(&self) -> usize {
        self.classes().iter().map(|c| c.len() * (c.len() - 1)).sum()
    }
}

impl PartialEq for EquivalenceGraph {
    fn eq(&self, other: &Self) -> bool {
        self.classes() == other.classes()
    }
}

/// Overlapping clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipGraph {
    n: usize,
    clusters: Vec<BTreeSet<usize>>,
}

impl MembershipGraph {
    /// No clusters.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            clusters: Vec::new(),
        }
    }

    /// Universe size.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Add a cluster; out-of-range members are ignored.
    pub fn add_cluster(&mut self, members: impl IntoIterator<Item = usize>) {
        let cluster: BTreeSet<usize> = members.into_iter().filter(|&e| e < self.n).collect();
        if cluster.len() > 1 {
            self.clusters.push(cluster);
        }
    }

    /// Current clusters.
    pub fn clusters(&self) -> &[BTreeSet<usize>] {
        &self.clusters
    }

    /// Whether `i` and `j` share a cluster.
    pub fn is_connected(&self, i: usize, j: usize) -> bool {
        if i >= self.n || j >= self.n {
            return false;
        }
        i == j || self.clusters.iter().any(|c| c.contains(&i) && c.contains(&j))
    }

    /// Put `j` into the first cluster of `i`, or open a cluster `{i, j}`.
    pub fn add(&mut self, i: usize, j: usize) -> bool {
        if i >= self.n || j >= self.n || self.is_connected(i, j) {
            return false;
        }
        match self.clusters.iter_mut().find(|c| c.contains(&i)) {
            Some(cluster) => {
                cluster.insert(j);
            }
            None => self.clusters.push([i, j].into_iter().collect()),
        }
        true
    }

    /// Remove `j` from every cluster it shares with `i`.
    pub fn remove(&mut self, i: usize, j: usize) -> bool {
        if i == j || !self.is_connected(i, j) {
            return false;
        }
        for cluster in &mut self.clusters {
            if cluster.contains(&i) {
                cluster.remove(&j);
            }
        }
        self.clusters.retain(|c| c.len() > 1);
        true
    }

    /// Number of connected off-diagonal ordered pairs.
    pub fn link_count(&self) -> usize {
        (0..self.n)
            .flat_map(|i| (0..self.n).map(move |j| (i, j)))
            .filter(|&(i, j)| i != j && self.is_connected(i, j))
            .count()
    }
}

/// One relation of a model.
#[derive(Debug, Clone, PartialEq)]
pub enum Graph {
    /// Weighted edges.
    Probability(ProbabilityGraph),
    /// Hard edges.
    Specific(SpecificGraph),
    /// Overlapping clusters.
    Membership(MembershipGraph),
    /// Partition.
    Equivalence(EquivalenceGraph),
}

impl Graph {
    /// Variant discriminant.
    pub fn kind(&self) -> GraphKind {
        match self {
            Graph::Probability(_) => GraphKind::Probability,
            Graph::Specific(_) => GraphKind::Specific,
            Graph::Membership(_) => GraphKind::Membership,
            Graph::Equivalence(_) => GraphKind::Equivalence,
        }
    }

    /// Universe size.
    pub fn n(&self) -> usize {
        match self {
            Graph::Probability(g) => g.n(),
            Graph::Specific(g) => g.n(),
            Graph::Membership(g) => g.n(),
            Graph::Equivalence(g) => g.n(),
        }
    }

    /// Whether `(i, j)` currently holds.
    pub fn is_connected(&self, i: usize, j: usize) -> bool {
        match self {
            Graph::Probability(g) => g.is_connected(i, j),
            Graph::Specific(g) => g.is_connected(i, j),
            Graph::Membership(g) => g.is_connected(i, j),
            Graph::Equivalence(g) => g.is_connected(i, j),
        }
    }

    /// Whether `(i, j)` can be toggled at all.
    pub fn mutable(&self, i: usize, j: usize) -> bool {
        i != j && i < self.n() && j < self.n()
    }

    /// Make `(i, j)` hold.
    ///
    /// Clusterings merge clusters; a probability graph is first hardened
    /// into a specific graph of its connected pairs.
    pub fn add(&mut self, i: usize, j: usize) -> bool {
        self.harden_probability();
        match self {
            Graph::Specific(g) => g.add(i, j),
            Graph::Membership(g) => g.add(i, j),
            Graph::Equivalence(g) => g.add(i, j),
            Graph::Probability(_) => false,
        }
    }

    /// Make `(i, j)` fail; see [`Graph::add`] for the variant semantics.
    pub fn remove(&mut self, i: usize, j: usize) -> bool {
        self.harden_probability();
        match self {
            Graph::Specific(g) => g.remove(i, j),
            Graph::Membership(g) => g.remove(i, j),
            Graph::Equivalence(g) => g.remove(i, j),
            Graph::Probability(_) => false,
        }
    }

    /// Toggle exactly the edge `(i, j)`, converting the graph into a
    /// specific graph first if needed. Returns false for immutable pairs.
    pub fn flip(&mut self, i: usize, j: usize) -> bool {
        if !self.mutable(i, j) {
            return false;
        }
        if !matches!(self, Graph::Specific(_)) {
            *self = Graph::Specific(self.to_specific());
        }
        match self {
            Graph::Specific(g) => {
                if g.is_connected(i, j) {
                    g.remove(i, j)
                } else {
                    g.add(i, j)
                }
            }
            _ => false,
        }
    }

    /// Number of connected off-diagonal ordered pairs.
    pub fn link_count(&self) -> usize {
        match self {
            Graph::Probability(g) => g.links().len(),
            Graph::Specific(g) => g.link_count(),
            Graph::Membership(g) => g.link_count(),
            Graph::Equivalence(g) => g.link_count(),
        }
    }

    /// Connected off-diagonal ordered pairs, sorted.
    pub fn links(&self) -> Vec<(usize, usize)> {
        match self {
            Graph::Probability(g) => g.links(),
            Graph::Specific(g) => g.links().collect(),
            _ => {
                let n = self.n();
                (0..n)
                    .flat_map(|i| (0..n).map(move |j| (i, j)))
                    .filter(|&(i, j)| i != j && self.is_connected(i, j))
                    .collect()
            }
        }
    }

    /// Whether reflexive pairs hold.
    pub fn is_reflexive(&self) -> bool {
        match self {
            Graph::Probability(g) => g.is_reflexive(),
            Graph::Specific(g) => g.is_reflexive(),
            Graph::Membership(_) | Graph::Equivalence(_) => true,
        }
    }

    /// Hard copy of the connected pairs.
    pub fn to_specific(&self) -> SpecificGraph {
        match self {
            Graph::Probability(g) => g.to_specific(),
            Graph::Specific(g) => g.clone(),
            _ => {
                let mut s = SpecificGraph::new(self.n());
                for (i, j) in self.links() {
                    s.add(i, j);
                }
                s
            }
        }
    }

    /// Weighted view, if this is a probability graph.
    pub fn as_probability(&self) -> Option<&ProbabilityGraph> {
        match self {
            Graph::Probability(g) => Some(g),
            _ => None,
        }
    }

    /// Mutable weighted view, if this is a probability graph.
    pub fn as_probability_mut(&mut self) -> Option<&mut ProbabilityGraph> {
        match self {
            Graph::Probability(g) => Some(g),
            _ => None,
        }
    }

    /// Hard view, if this is a specific graph.
    pub fn as_specific(&self) -> Option<&SpecificGraph> {
        match self {
            Graph::Specific(g) => Some(g),
            _ => None,
        }
    }

    /// Induced subgraph over `elements`; element `k` of the result is
    /// `elements[k]` of `self`.
    pub fn restrict(&self, elements: &[usize]) -> Graph {
        let k = elements.len();
        let pairs = || {
            elements.iter().enumerate().flat_map(move |(li, &gi)| {
                elements
                    .iter()
                    .enumerate()
                    .filter(move |&(lj, _)| lj != li)
                    .map(move |(lj, &gj)| (li, lj, gi, gj))
            })
        };
        match self {
            Graph::Probability(g) => {
                let mut sub = ProbabilityGraph::new(k);
                sub.base = g.base;
                sub.reflexive = g.reflexive;
                for (li, lj, gi, gj) in pairs() {
                    if let Some(&costs) = g.values.get(&(gi, gj)) {
                        sub.values.insert((li, lj), costs);
                    }
                }
                Graph::Probability(sub)
            }
            Graph::Specific(g) => {
                let mut sub = SpecificGraph::new(k);
                sub.reflexive = g.reflexive;
                for (li, lj, gi, gj) in pairs() {
                    if g.is_connected(gi, gj) {
                        sub.add(li, lj);
                    }
                }
                Graph::Specific(sub)
            }
            Graph::Equivalence(g) => {
                let mut sub = EquivalenceGraph::new(k);
                for (li, lj, gi, gj) in pairs() {
                    if g.is_connected(gi, gj) {
                        sub.add(li, lj);
                    }
                }
                Graph::Equivalence(sub)
            }
            Graph::Membership(g) => {
                let mut sub = MembershipGraph::new(k);
                for cluster in g.clusters() {
                    sub.add_cluster(
                        elements
                            .iter()
                            .enumerate()
                            .filter(|(_, e)| cluster.contains(*e))
                            .map(|(l, _)| l),
                    );
                }
                Graph::Membership(sub)
            }
        }
    }

    fn harden_probability(&mut self) {
        if let Graph::Probability(g) = self {
            *self = Graph::Specific(g.to_specific());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_costs() {
        let mut g = ProbabilityGraph::new(3);
        g.set_base_val(0.02);
        g.set_val(0, 1, 0.8);
        assert!((g.remove_val(0, 1) - (0.8f64 / 0.2).ln()).abs() < 1e-12);
        assert!((g.add_val(0, 1) + (0.8f64 / 0.2).ln()).abs() < 1e-12);
        assert!(g.is_connected(0, 1));
        assert!(!g.is_connected(1, 0));
        assert!((g.flip_cost(1, 0) - (0.98f64 / 0.02).ln()).abs() < 1e-12);
        assert!((g.probability(0, 1) - 0.8).abs() < 1e-12);
        assert!(g.is_connected(2, 2));
        g.set_reflexive(false);
        assert!(!g.is_connected(2, 2));
    }

    #[test]
    fn test_probability_ignores_diagonal_values() {
        let mut g = ProbabilityGraph::new(2);
        g.set_val(1, 1, 0.0001);
        assert!(g.observed().is_empty());
        assert!(g.is_connected(1, 1));
    }

    #[test]
    fn test_dense_prior_links() {
        let mut g = ProbabilityGraph::new(3);
        g.set_base_val(0.9);
        g.set_val(0, 2, 0.1);
        let links = g.links();
        assert_eq!(links.len(), 5);
        assert!(!links.contains(&(0, 2)));
    }

    #[test]
    fn test_specific_graph() {
        let mut g = SpecificGraph::new(3);
        assert!(g.add(0, 1));
        assert!(!g.add(0, 1));
        assert!(!g.add(1, 1));
        assert!(!g.add(0, 3));
        assert!(g.is_connected(0, 1));
        assert!(g.is_connected(2, 2));
        assert_eq!(g.link_count(), 1);
        assert!(g.remove(0, 1));
        assert!(!g.is_connected(0, 1));
    }

    #[test]
    fn test_equivalence_merge_and_split() {
        let mut g = EquivalenceGraph::new(4);
        g.add(0, 1);
        g.add(2, 1);
        assert!(g.is_connected(0, 2));
        assert_eq!(g.classes(), vec![vec![0, 1, 2], vec![3]]);
        assert_eq!(g.link_count(), 6);
        assert!(g.remove(0, 1));
        assert!(g.is_connected(0, 2));
        assert!(!g.is_connected(1, 2));
        let rebuilt = EquivalenceGraph::from_classes(4, &[vec![2, 0]]);
        assert_eq!(g, rebuilt);
    }

    #[test]
    fn test_membership_overlap() {
        let mut g = MembershipGraph::new(5);
        g.add_cluster([0, 1, 2]);
        g.add_cluster([2, 3]);
        assert!(g.is_connected(0, 2));
        assert!(g.is_connected(2, 3));
        assert!(!g.is_connected(0, 3));
        assert!(g.add(0, 4));
        assert!(g.is_connected(4, 1));
        assert!(g.remove(2, 0));
        assert!(!g.is_connected(0, 1));
        assert!(g.is_connected(1, 2));
    }

    #[test]
    fn test_flip_hardens() {
        let mut p = ProbabilityGraph::new(3);
        p.set_val(0, 1, 0.9);
        let mut g = Graph::Probability(p);
        assert!(!g.flip(1, 1));
        assert!(g.flip(0, 1));
        assert_eq!(g.kind(), GraphKind::Specific);
        assert!(!g.is_connected(0, 1));
        assert!(g.flip(1, 2));
        assert_eq!(g.links(), vec![(1, 2)]);
    }

    #[test]
    fn test_restrict() {
        let mut p = ProbabilityGraph::new(4);
        p.set_base_val(0.05);
        p.set_val(1, 3, 0.9);
        p.set_val(0, 1, 0.9);
        let sub = Graph::Probability(p).restrict(&[1, 3]);
        assert_eq!(sub.n(), 2);
        assert!(sub.is_connected(0, 1));
        assert!(!sub.is_connected(1, 0));
        let observed = sub.as_probability().map(|g| g.observed());
        assert_eq!(observed, Some(vec![(0, 1)]));

        let mut m = MembershipGraph::new(4);
        m.add_cluster([0, 2, 3]);
        let sub = Graph::Membership(m).restrict(&[2, 3]);
        assert!(sub.is_connected(0, 1));
    }

    #[test]
    fn test_capability_queries() {
        let g = Graph::Equivalence(EquivalenceGraph::new(2));
        assert!(g.as_probability().is_none());
        assert!(g.as_specific().is_none());
        assert_eq!(g.to_specific().link_count(), 0);
    }
}
