//! Models: a term universe with one graph per named relation.
//!
//! Edge identifiers enumerate `(relation, i, j)` triples densely:
//! `id = relation * n * n + i * n + j`. The mapping is a bijection for a
//! fixed universe size and relation count, which lets solvers work on plain
//! `usize` sets.

use crate::error::{LogicError, Result};
use crate::graph::{
    EquivalenceGraph, Graph, MembershipGraph, ProbabilityGraph, SpecificGraph,
};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Index of a term in `0..n`.
pub type ElementId = usize;

/// Index of a relation inside a model.
pub type RelationId = usize;

/// Dense identifier of a `(relation, i, j)` triple.
pub type EdgeId = usize;

/// A universe of `n` terms and its relations.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    n: usize,
    names: Vec<String>,
    graphs: Vec<Graph>,
    index: FxHashMap<String, RelationId>,
}

impl Model {
    /// Create a model with no relations.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            names: Vec::new(),
            graphs: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Universe size.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of relations.
    pub fn num_relations(&self) -> usize {
        self.graphs.len()
    }

    /// Number of edge identifiers.
    pub fn num_edges(&self) -> usize {
        self.graphs.len() * self.n * self.n
    }

    /// Insert or replace the graph of `name`.
    pub fn add_graph(&mut self, name: &str, graph: Graph) -> Result<RelationId> {
        if graph.n() != self.n {
            return Err(LogicError::ShapeMismatch(format!(
                "graph `{}` has {} elements, model has {}",
                name,
                graph.n(),
                self.n
            )));
        }
        Ok(self.insert(name, graph))
    }

    /// Insert an empty probability graph for `name` and return it.
    pub fn add_probability_graph(&mut self, name: &str) -> &mut ProbabilityGraph {
        let n = self.n;
        let rel = self.insert(name, Graph::Probability(ProbabilityGraph::new(n)));
        probability_slot(&mut self.graphs[rel], n)
    }

    /// Insert an empty specific graph for `name` and return it.
    pub fn add_specific_graph(&mut self, name: &str) -> &mut SpecificGraph {
        let n = self.n;
        let rel = self.insert(name, Graph::Specific(SpecificGraph::new(n)));
        specific_slot(&mut self.graphs[rel], n)
    }

    /// Insert a singleton partition for `name` and return it.
    pub fn add_equivalence_graph(&mut self, name: &str) -> &mut EquivalenceGraph {
        let n = self.n;
        let rel = self.insert(name, Graph::Equivalence(EquivalenceGraph::new(n)));
        equivalence_slot(&mut self.graphs[rel], n)
    }

    /// Insert an empty clustering for `name` and return it.
    pub fn add_membership_graph(&mut self, name: &str) -> &mut MembershipGraph {
        let n = self.n;
        let rel = self.insert(name, Graph::Membership(MembershipGraph::new(n)));
        membership_slot(&mut self.graphs[rel], n)
    }

    fn insert(&mut self, name: &str, graph: Graph) -> RelationId {
        if let Some(&rel) = self.index.get(name) {
            self.graphs[rel] = graph;
            return rel;
        }
        let rel = self.graphs.len();
        self.names.push(name.to_string());
        self.graphs.push(graph);
        self.index.insert(name.to_string(), rel);
        rel
    }

    /// Relation id of `name`.
    pub fn relation_id(&self, name: &str) -> Option<RelationId> {
        self.index.get(name).copied()
    }

    /// Name of relation `rel`.
    pub fn relation_name(&self, rel: RelationId) -> Option<&str> {
        self.names.get(rel).map(String::as_str)
    }

    /// Relation names in id order.
    pub fn relation_names(&self) -> &[String] {
        &self.names
    }

    /// Graph of `name`.
    pub fn graph(&self, name: &str) -> Option<&Graph> {
        self.relation_id(name).map(|rel| &self.graphs[rel])
    }

    /// Mutable graph of `name`.
    pub fn graph_mut(&mut self, name: &str) -> Option<&mut Graph> {
        self.relation_id(name).map(|rel| &mut self.graphs[rel])
    }

    /// Graph of relation `rel`.
    pub fn graph_by_id(&self, rel: RelationId) -> Option<&Graph> {
        self.graphs.get(rel)
    }

    /// Mutable graph of relation `rel`.
    pub fn graph_by_id_mut(&mut self, rel: RelationId) -> Option<&mut Graph> {
        self.graphs.get_mut(rel)
    }

    /// Graphs in id order.
    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    /// Edge id of `(rel, i, j)`.
    #[inline]
    pub fn id(&self, rel: RelationId, i: ElementId, j: ElementId) -> EdgeId {
        rel * self.n * self.n + i * self.n + j
    }

    /// Relation of edge `id`.
    #[inline]
    pub fn rel_by_id(&self, id: EdgeId) -> RelationId {
        id / (self.n * self.n).max(1)
    }

    /// First element of edge `id`.
    #[inline]
    pub fn i_by_id(&self, id: EdgeId) -> ElementId {
        (id % (self.n * self.n).max(1)) / self.n.max(1)
    }

    /// Second element of edge `id`.
    #[inline]
    pub fn j_by_id(&self, id: EdgeId) -> ElementId {
        id % self.n.max(1)
    }

    /// `(relation, i, j)` of edge `id`.
    pub fn edge(&self, id: EdgeId) -> (RelationId, ElementId, ElementId) {
        (self.rel_by_id(id), self.i_by_id(id), self.j_by_id(id))
    }

    /// Human-readable `name(i,j)` of edge `id`.
    pub fn edge_name(&self, id: EdgeId) -> String {
        let (rel, i, j) = self.edge(id);
        format!("{}({},{})", self.relation_name(rel).unwrap_or("?"), i, j)
    }

    /// Whether `(rel, i, j)` holds.
    pub fn is_connected(&self, rel: RelationId, i: ElementId, j: ElementId) -> bool {
        self.graphs
            .get(rel)
            .is_some_and(|g| g.is_connected(i, j))
    }

    /// Whether edge `id` holds.
    pub fn is_connected_id(&self, id: EdgeId) -> bool {
        let (rel, i, j) = self.edge(id);
        self.is_connected(rel, i, j)
    }

    /// Truth value that `rel(x, y)` takes under every instantiation no
    /// solver can change, or `None` when it varies or can be flipped.
    ///
    /// Diagonal pairs are never flippable, so a `diagonal` atom is fixed when
    /// every element agrees. Other atoms are fixed only on hard graphs that
    /// are complete or empty.
    pub fn fixed_truth(&self, rel: RelationId, diagonal: bool) -> Option<bool> {
        let graph = self.graphs.get(rel)?;
        let mut values = if diagonal {
            (0..self.n)
                .map(|i| graph.is_connected(i, i))
                .collect::<Vec<_>>()
        } else {
            if graph.as_probability().is_some() {
                return None;
            }
            (0..self.n)
                .flat_map(|i| (0..self.n).map(move |j| (i, j)))
                .map(|(i, j)| graph.is_connected(i, j))
                .collect()
        };
        values.dedup();
        match values.as_slice() {
            [value] => Some(*value),
            _ => None,
        }
    }

    /// Whether a solver may flip edge `id`: an off-diagonal pair of a
    /// probability graph.
    pub fn is_flippable(&self, id: EdgeId) -> bool {
        let (rel, i, j) = self.edge(id);
        i != j
            && self
                .graphs
                .get(rel)
                .is_some_and(|g| g.as_probability().is_some())
    }

    /// Cost of moving edge `id` away from its most likely value, or
    /// infinity when it cannot be flipped.
    pub fn flip_cost(&self, id: EdgeId) -> f64 {
        if !self.is_flippable(id) {
            return f64::INFINITY;
        }
        let (rel, i, j) = self.edge(id);
        self.graphs[rel]
            .as_probability()
            .map_or(f64::INFINITY, |g| g.flip_cost(i, j))
    }

    /// Change in total probability cost when `id` is flipped away from its
    /// most likely value (always non-negative).
    pub fn flip_delta(&self, id: EdgeId) -> f64 {
        let (rel, i, j) = self.edge(id);
        match self.graphs.get(rel).and_then(Graph::as_probability) {
            Some(g) if g.is_connected(i, j) => g.remove_val(i, j),
            Some(g) => g.add_val(i, j),
            None => f64::INFINITY,
        }
    }

    /// Every flippable edge id, ascending.
    pub fn flippable_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.num_edges()).filter(|&id| self.is_flippable(id))
    }

    /// Copy in which every probability graph is replaced by a specific
    /// graph of its connected pairs.
    pub fn create_specific_copy(&self) -> Model {
        let mut copy = self.clone();
        for graph in &mut copy.graphs {
            if let Graph::Probability(g) = graph {
                *graph = Graph::Specific(g.to_specific());
            }
        }
        copy
    }

    /// Flip every edge in `ids`. Returns how many edges actually changed.
    pub fn symm_diff_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a EdgeId>) -> usize {
        let mut changed = 0;
        for &id in ids {
            let (rel, i, j) = self.edge(id);
            if let Some(graph) = self.graphs.get_mut(rel)
                && graph.flip(i, j)
            {
                changed += 1;
            }
        }
        changed
    }

    /// Edges whose truth value differs between `self` and `other`.
    pub fn symm_diff(&self, other: &Model) -> Result<BTreeSet<EdgeId>> {
        if self.n != other.n || self.names != other.names {
            return Err(LogicError::ShapeMismatch(
                "models differ in universe or relations".to_string(),
            ));
        }
        Ok((0..self.num_edges())
            .filter(|&id| self.is_connected_id(id) != other.is_connected_id(id))
            .collect())
    }

    /// Weakly connected components over connected and observed pairs of
    /// every relation. Singletons are included; components are ordered by
    /// their smallest element.
    pub fn component_split(&self) -> Vec<Component> {
        let mut parent: Vec<usize> = (0..self.n).collect();
        for graph in &self.graphs {
            let mut pairs = graph.links();
            if let Some(g) = graph.as_probability() {
                pairs.extend(g.observed());
            }
            for (i, j) in pairs {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }

        let mut groups: FxHashMap<usize, Vec<ElementId>> = FxHashMap::default();
        for e in 0..self.n {
            let root = find(&mut parent, e);
            groups.entry(root).or_default().push(e);
        }
        let mut groups: Vec<Vec<ElementId>> = groups.into_values().collect();
        groups.sort_unstable();

        groups
            .into_iter()
            .map(|elements| {
                let mut model = Model::new(elements.len());
                for (name, graph) in self.names.iter().zip(&self.graphs) {
                    model.insert(name, graph.restrict(&elements));
                }
                Component {
                    model,
                    elements,
                    global_n: self.n,
                }
            })
            .collect()
    }
}

/// `$name(slot, n)` views `slot` as the `$variant` graph, resetting it to an
/// empty one of size `n` when it holds another kind.
macro_rules! slot_as {
    ($name:ident, $variant:ident, $ty:ident) => {
        fn $name(slot: &mut Graph, n: usize) -> &mut $ty {
            match slot {
                Graph::$variant(g) => g,
                _ => {
                    *slot = Graph::$variant($ty::new(n));
                    $name(slot, n)
                }
            }
        }
    };
}

slot_as!(probability_slot, Probability, ProbabilityGraph);
slot_as!(specific_slot, Specific, SpecificGraph);
slot_as!(equivalence_slot, Equivalence, EquivalenceGraph);
slot_as!(membership_slot, Membership, MembershipGraph);

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// One connected component of a model.
#[derive(Debug, Clone)]
pub struct Component {
    /// Induced sub-model over the component's elements.
    pub model: Model,
    /// Global element id of each local element.
    pub elements: Vec<ElementId>,
    global_n: usize,
}

impl Component {
    /// Global element id of local element `local`.
    pub fn global_element(&self, local: ElementId) -> ElementId {
        self.elements[local]
    }

    /// Lift a local edge id to the id of the same edge in the split model.
    pub fn global_edge(&self, local: EdgeId) -> EdgeId {
        let (rel, i, j) = self.model.edge(local);
        let n = self.global_n;
        rel * n * n + self.elements[i] * n + self.elements[j]
    }
}
