//! Grounding of rules into clauses over edge literals.
//!
//! Each instantiation of a rule becomes the clause
//! `!p1 | ... | !pk | c1 | ... | cm` with every atom replaced by its edge.
//! Only flippable edges survive as literals: atoms on reflexive pairs or on
//! non-probabilistic graphs have a fixed truth value and are evaluated away.
//! A fixed true literal satisfies the clause for good, so such clauses are
//! skipped, as are clauses containing both polarities of one edge.

use crate::error::{LogicError, Result};
use crate::logic::{Logic, enumerate, literal_holds};
use crate::model::{EdgeId, ElementId, Model, RelationId};
use crate::pool::RuleId;
use crate::rule::Literal;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

/// Edge literal: satisfied when the edge's truth value equals `positive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClauseLit {
    /// Edge id.
    pub edge: EdgeId,
    /// Required truth value.
    pub positive: bool,
}

impl ClauseLit {
    /// Whether the literal holds in `model`.
    #[inline]
    pub fn holds(&self, model: &Model) -> bool {
        model.is_connected_id(self.edge) == self.positive
    }
}

/// Disjunction of edge literals, sorted by edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroundClause {
    /// Rule the clause was instantiated from.
    pub rule: RuleId,
    /// Literals, sorted and distinct.
    pub lits: SmallVec<[ClauseLit; 4]>,
}

impl GroundClause {
    /// Number of literals holding in `model`.
    pub fn true_count(&self, model: &Model) -> usize {
        self.lits.iter().filter(|l| l.holds(model)).count()
    }

    /// Whether some literal holds in `model`.
    pub fn is_satisfied(&self, model: &Model) -> bool {
        self.lits.iter().any(|l| l.holds(model))
    }

    /// Literal on `edge`, if any.
    pub fn lit_on(&self, edge: EdgeId) -> Option<&ClauseLit> {
        self.lits.iter().find(|l| l.edge == edge)
    }
}

/// Which ground clauses to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroundScope {
    /// Every clause.
    #[default]
    All,
    /// Clauses with at most `k` true literals; `0` keeps violated clauses.
    NearViolated(usize),
}

impl GroundScope {
    fn admits(self, true_count: usize) -> bool {
        match self {
            GroundScope::All => true,
            GroundScope::NearViolated(k) => true_count <= k,
        }
    }
}

impl Logic {
    /// Ground every rule over `model`, which decides both flippability and
    /// truth.
    pub fn ground_clauses(&self, model: &Model, scope: GroundScope) -> Result<Vec<GroundClause>> {
        self.ground_clauses_with(model, model, scope)
    }

    /// Ground every rule. Edges flippable in `flippable` become literals;
    /// truth values and the scope filter come from `truth`, which must have
    /// the same universe and relations (typically a specific copy of
    /// `flippable` with some flips applied).
    pub fn ground_clauses_with(
        &self,
        flippable: &Model,
        truth: &Model,
        scope: GroundScope,
    ) -> Result<Vec<GroundClause>> {
        if flippable.n() != truth.n() || flippable.relation_names() != truth.relation_names() {
            return Err(LogicError::ShapeMismatch(
                "grounding models differ in universe or relations".to_string(),
            ));
        }
        let binding = self.bind(flippable)?;
        let edge_of = |l: &Literal, a: &[ElementId]| -> EdgeId {
            let [x, y] = l.atom.args;
            flippable.id(
                binding[l.atom.relation],
                a[x as usize - 1],
                a[y as usize - 1],
            )
        };
        let fixed_false_premise = |l: &Literal, a: &[ElementId]| {
            !flippable.is_flippable(edge_of(l, a)) && !literal_holds(truth, &binding, l, a)
        };

        let mut seen: FxHashSet<SmallVec<[ClauseLit; 4]>> = FxHashSet::default();
        let mut out = Vec::new();
        for (id, rule) in self.rules() {
            enumerate(
                rule,
                flippable.n(),
                |p, a| !fixed_false_premise(p, a),
                |a| {
                    let resolve = |l: &Literal, a: &[ElementId]| {
                        let edge = edge_of(l, a);
                        flippable
                            .is_flippable(edge)
                            .then_some(edge)
                            .ok_or_else(|| literal_holds(truth, &binding, l, a))
                    };
                    let Some(lits) =
                        ground_lits(rule.premises(), rule.conclusions(), a, &resolve)
                    else {
                        return;
                    };
                    let true_count = lits.iter().filter(|l| l.holds(truth)).count();
                    if scope.admits(true_count) && seen.insert(lits.clone()) {
                        out.push(GroundClause { rule: id, lits });
                    }
                },
            );
        }
        debug!(clauses = out.len(), ?scope, "grounded logic");
        Ok(out)
    }
}

/// Literal list of one instantiation, or `None` when a fixed literal or a
/// complementary pair satisfies it. `resolve` maps an atom to its edge when
/// flippable and to its fixed truth value otherwise.
fn ground_lits(
    premises: &[Literal],
    conclusions: &[Literal],
    a: &[ElementId],
    resolve: &dyn Fn(&Literal, &[ElementId]) -> std::result::Result<EdgeId, bool>,
) -> Option<SmallVec<[ClauseLit; 4]>> {
    let mut lits: SmallVec<[ClauseLit; 4]> = SmallVec::new();
    let sides = premises
        .iter()
        .map(|l| (l, true))
        .chain(conclusions.iter().map(|l| (l, false)));
    for (l, is_premise) in sides {
        match resolve(l, a) {
            Ok(edge) => lits.push(ClauseLit {
                edge,
                positive: l.negated == is_premise,
            }),
            // The clause literal is the premise's negation.
            Err(holds) if holds != is_premise => return None,
            Err(_) => {}
        }
    }
    lits.sort_unstable();
    lits.dedup();
    if lits.windows(2).any(|w| w[0].edge == w[1].edge) {
        return None;
    }
    Some(lits)
}

/// Relation ids referenced by `clauses`, for diagnostics.
pub fn clause_relations(model: &Model, clauses: &[GroundClause]) -> Vec<RelationId> {
    let mut rels: Vec<RelationId> = clauses
        .iter()
        .flat_map(|c| c.lits.iter().map(|l| model.rel_by_id(l.edge)))
        .collect();
    rels.sort_unstable();
    rels.dedup();
    rels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Model {
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

    fn transitivity() -> Logic {
        Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap()
    }

    #[test]
    fn test_violated_clauses() {
        let model = fixture();
        let clauses = transitivity()
            .ground_clauses(&model, GroundScope::NearViolated(0))
            .unwrap();
        assert_eq!(clauses.len(), 2);
        let e = |i, j| model.id(0, i, j);
        let first: Vec<ClauseLit> = clauses[0].lits.to_vec();
        assert_eq!(
            first,
            vec![
                ClauseLit { edge: e(0, 1), positive: false },
                ClauseLit { edge: e(0, 2), positive: true },
                ClauseLit { edge: e(1, 2), positive: false },
            ]
        );
        assert!(clauses.iter().all(|c| c.true_count(&model) == 0));
    }

    #[test]
    fn test_all_clauses_skip_fixed() {
        let model = fixture();
        let clauses = transitivity().ground_clauses(&model, GroundScope::All).unwrap();
        // Distinct triples only: any repeated element puts a reflexive
        // literal in the clause, which is either fixed true or a tautology.
        assert_eq!(clauses.len(), 24);
        assert!(clauses.iter().all(|c| c.lits.len() == 3));
        let near = transitivity()
            .ground_clauses(&model, GroundScope::NearViolated(1))
            .unwrap();
        assert!(near.len() > 2 && near.len() < 24);
    }

    #[test]
    fn test_truth_model_separate() {
        let model = fixture();
        let mut candidate = model.create_specific_copy();
        candidate.symm_diff_all(&[model.id(0, 0, 2), model.id(0, 1, 3)]);
        let clauses = transitivity()
            .ground_clauses_with(&model, &candidate, GroundScope::NearViolated(0))
            .unwrap();
        let mut violated: Vec<Vec<usize>> = clauses
            .iter()
            .map(|c| c.lits.iter().map(|l| l.edge).collect())
            .collect();
        violated.sort();
        let e = |i, j| model.id(0, i, j);
        assert_eq!(
            violated,
            vec![vec![e(0, 1), e(1, 3), e(0, 3)], vec![e(0, 2), e(2, 3), e(0, 3)]]
                .into_iter()
                .map(|mut v| {
                    v.sort();
                    v
                })
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_fixed_relation_evaluated_away() {
        let logic = Logic::parse("syn(1,2) -> hyp(1,2)").unwrap();
        let mut model = Model::new(3);
        model.add_probability_graph("hyp");
        model.add_equivalence_graph("syn").add(0, 1);
        let clauses = logic.ground_clauses(&model, GroundScope::All).unwrap();
        let edges: Vec<Vec<(usize, bool)>> = clauses
            .iter()
            .map(|c| c.lits.iter().map(|l| (l.edge, l.positive)).collect())
            .collect();
        let hyp = model.relation_id("hyp").unwrap();
        assert_eq!(
            edges,
            vec![
                vec![(model.id(hyp, 0, 1), true)],
                vec![(model.id(hyp, 1, 0), true)]
            ]
        );
        assert_eq!(clause_relations(&model, &clauses), vec![hyp]);
    }
}
