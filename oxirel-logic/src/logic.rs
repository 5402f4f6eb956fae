//! Rule sets and consistency checking.
//!
//! A [`Logic`] is an ordered list of distinct canonical rules plus the table
//! of relation names their atoms refer to. It is bound to a [`Model`] by
//! name at check time, so one logic can be checked against many models.

use crate::error::{LogicError, Result};
use crate::model::{ElementId, Model, RelationId};
use crate::parser;
use crate::pool::{RuleId, RulePool};
use crate::rule::{Atom, Literal, Rule};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One violating instantiation of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Violated rule.
    pub rule: RuleId,
    /// Element bound to each variable; `assignment[v - 1]` is variable `v`.
    pub assignment: SmallVec<[ElementId; 4]>,
}

/// Ordered set of rules over named relations.
#[derive(Debug, Clone, Default)]
pub struct Logic {
    names: Vec<String>,
    name_index: FxHashMap<String, RelationId>,
    pool: RulePool,
    rules: Vec<RuleId>,
}

impl Logic {
    /// Create an empty logic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse rule-file text.
    pub fn parse(text: &str) -> Result<Self> {
        parser::parse_logic(text)
    }

    /// Read and parse a rule file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Id of relation `name`, registering it on first use.
    pub fn intern_relation(&mut self, name: &str) -> RelationId {
        if let Some(&rel) = self.name_index.get(name) {
            return rel;
        }
        let rel = self.names.len();
        self.names.push(name.to_string());
        self.name_index.insert(name.to_string(), rel);
        rel
    }

    /// Id of relation `name`.
    pub fn relation_id(&self, name: &str) -> Option<RelationId> {
        self.name_index.get(name).copied()
    }

    /// Relation names in id order.
    pub fn relation_names(&self) -> &[String] {
        &self.names
    }

    /// Append `rule` in canonical form unless an identical rule is present.
    pub fn add_rule(&mut self, rule: &Rule) -> RuleId {
        let id = self.pool.intern(rule);
        if !self.rules.contains(&id) {
            self.rules.push(id);
        }
        id
    }

    /// Rule `id`.
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.pool.get(id)
    }

    /// Rules in order.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .filter_map(|&id| self.pool.get(id).map(|r| (id, r)))
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the logic has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule pool backing this logic.
    pub fn pool(&self) -> &RulePool {
        &self.pool
    }

    /// Whether every rule is range restricted.
    pub fn is_range_restricted(&self) -> bool {
        self.rules().all(|(_, r)| r.is_range_restricted())
    }

    /// Drop tautologies and subsumed rules. Of two rules subsuming each
    /// other the earlier one is kept.
    pub fn simplify(&mut self) {
        let simplified: Vec<Rule> = self
            .rules()
            .filter_map(|(_, r)| r.simplify())
            .collect();
        self.keep_unsubsumed(simplified);
    }

    /// [`Logic::simplify`] with literals that `model` fixes for every
    /// instantiation evaluated away first, see [`Rule::simplify_with`].
    pub fn simplify_with(&mut self, model: &Model) -> Result<()> {
        let binding = self.bind(model)?;
        let fixed = |atom: &Atom| {
            model.fixed_truth(binding[atom.relation], atom.args[0] == atom.args[1])
        };
        let simplified: Vec<Rule> = self
            .rules()
            .filter_map(|(_, r)| r.simplify_with(fixed))
            .collect();
        self.keep_unsubsumed(simplified);
        Ok(())
    }

    fn keep_unsubsumed(&mut self, simplified: Vec<Rule>) {
        let mut kept: Vec<Rule> = Vec::new();
        for (k, rule) in simplified.iter().enumerate() {
            let redundant = simplified.iter().enumerate().any(|(o, other)| {
                o != k && other.subsumes(rule) && (!rule.subsumes(other) || o < k)
            });
            if !redundant {
                kept.push(rule.clone());
            }
        }
        debug!(before = self.rules.len(), after = kept.len(), "simplified logic");
        self.rules.clear();
        for rule in &kept {
            self.add_rule(rule);
        }
    }

    /// Model relation id of every logic relation.
    pub fn bind(&self, model: &Model) -> Result<Vec<RelationId>> {
        self.names
            .iter()
            .map(|name| {
                model
                    .relation_id(name)
                    .ok_or_else(|| LogicError::MissingRelation(name.clone()))
            })
            .collect()
    }

    /// Call `action` on every violating instantiation. Returns the number of
    /// violations.
    pub fn consist_check(
        &self,
        model: &Model,
        mut action: impl FnMut(&Violation),
    ) -> Result<usize> {
        let binding = self.bind(model)?;
        let holds = |l: &Literal, a: &[ElementId]| literal_holds(model, &binding, l, a);
        let mut count = 0;
        for (id, rule) in self.rules() {
            enumerate(rule, model.n(), holds, |assignment| {
                if !rule.conclusions().iter().any(|c| holds(c, assignment)) {
                    count += 1;
                    action(&Violation {
                        rule: id,
                        assignment: assignment.iter().copied().collect(),
                    });
                }
            });
        }
        Ok(count)
    }

    /// Every violating instantiation, by rule then assignment.
    pub fn violations(&self, model: &Model) -> Result<Vec<Violation>> {
        let mut out = Vec::new();
        self.consist_check(model, |v| out.push(v.clone()))?;
        Ok(out)
    }

    /// Whether `model` satisfies every rule.
    pub fn is_consistent(&self, model: &Model) -> Result<bool> {
        Ok(self.consist_check(model, |_| {})? == 0)
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, rule) in self.rules() {
            writeln!(f, "{}", rule.display(&self.names))?;
        }
        Ok(())
    }
}

/// Truth of `literal` under `assignment` in `model`.
pub(crate) fn literal_holds(
    model: &Model,
    binding: &[RelationId],
    literal: &Literal,
    assignment: &[ElementId],
) -> bool {
    let [a, b] = literal.atom.args;
    let i = assignment[a as usize - 1];
    let j = assignment[b as usize - 1];
    model.is_connected(binding[literal.atom.relation], i, j) != literal.negated
}

/// Depth-first enumeration of the instantiations of a canonical rule over
/// `0..n`. A premise is tested with `admit` as soon as its variables are
/// bound; a rejected premise prunes the subtree. `leaf` sees every complete
/// assignment whose premises were all admitted.
pub(crate) fn enumerate(
    rule: &Rule,
    n: usize,
    mut admit: impl FnMut(&Literal, &[ElementId]) -> bool,
    mut leaf: impl FnMut(&[ElementId]),
) {
    let k = rule.max_var() as usize;
    let mut by_var: Vec<SmallVec<[Literal; 2]>> = vec![SmallVec::new(); k + 1];
    for p in rule.premises() {
        let [a, b] = p.atom.args;
        by_var[a.max(b) as usize].push(*p);
    }
    if k == 0 {
        leaf(&[]);
        return;
    }
    if n == 0 {
        return;
    }

    let mut assignment: Vec<ElementId> = vec![0; k];
    let mut depth = 0;
    loop {
        let admitted = by_var[depth + 1]
            .iter()
            .all(|p| admit(p, &assignment[..=depth]));
        if admitted {
            if depth + 1 == k {
                leaf(&assignment);
            } else {
                depth += 1;
                assignment[depth] = 0;
                continue;
            }
        }
        // Advance to the next candidate, backtracking past exhausted vars.
        loop {
            assignment[depth] += 1;
            if assignment[depth] < n {
                break;
            }
            if depth == 0 {
                return;
            }
            depth -= 1;
        }
    }
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

    #[test]
    fn test_enumerate_all() {
        let rule = Rule::new([Literal::positive(0, 1, 2)], [Literal::positive(0, 2, 1)]);
        let mut seen = Vec::new();
        enumerate(&rule, 3, |_, _| true, |a| seen.push(a.to_vec()));
        assert_eq!(seen.len(), 9);
        assert_eq!(seen[0], vec![0, 0]);
        assert_eq!(seen[8], vec![2, 2]);
    }

    #[test]
    fn test_enumerate_prunes() {
        let rule = Rule::new(
            [Literal::positive(0, 1, 2), Literal::positive(0, 2, 3)],
            [Literal::positive(0, 1, 3)],
        );
        let mut leaves = 0;
        enumerate(&rule, 4, |p, a| p.atom.args[0] != 1 || a[0] == 3, |_| leaves += 1);
        assert_eq!(leaves, 16);
    }

    #[test]
    fn test_fixture_violations() {
        let logic = Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap();
        let model = fixture();
        let violations = logic.violations(&model).unwrap();
        let assignments: Vec<Vec<usize>> =
            violations.iter().map(|v| v.assignment.to_vec()).collect();
        assert_eq!(assignments, vec![vec![0, 1, 2], vec![1, 2, 3]]);
        assert!(!logic.is_consistent(&model).unwrap());

        let mut fixed = model.create_specific_copy();
        fixed.symm_diff_all(&[model.id(0, 1, 2)]);
        assert!(logic.is_consistent(&fixed).unwrap());
    }

    #[test]
    fn test_missing_relation() {
        let logic = Logic::parse("syn(1,2) -> syn(2,1)").unwrap();
        let err = logic.is_consistent(&fixture());
        assert!(matches!(err, Err(LogicError::MissingRelation(name)) if name == "syn"));
    }

    #[test]
    fn test_negated_conclusion_constraint() {
        let logic = Logic::parse("hyp(1,2) -> !hyp(2,1)").unwrap();
        let mut model = Model::new(2);
        let g = model.add_specific_graph("hyp");
        g.set_reflexive(false);
        g.add(0, 1);
        assert!(logic.is_consistent(&model).unwrap());
        if let Some(g) = model.graph_mut("hyp") {
            g.add(1, 0);
        }
        assert_eq!(logic.violations(&model).unwrap().len(), 2);
    }

    #[test]
    fn test_simplify_drops_subsumed() {
        let mut logic = Logic::parse(
            "hyp(1,2) -> hyp(2,1)\n\
             hyp(1,2); hyp(2,3) -> hyp(2,1)\n\
             hyp(1,2) -> hyp(1,2)",
        )
        .unwrap();
        assert_eq!(logic.len(), 3);
        logic.simplify();
        assert_eq!(logic.len(), 1);
        assert_eq!(logic.to_string(), "hyp(1,2) -> hyp(2,1)\n");
    }

    #[test]
    fn test_simplify_with_reflexive_model() {
        let mut logic = Logic::parse(
            "syn(1,1); syn(1,2) -> syn(2,1)\n\
             syn(1,2) -> syn(1,1)\n\
             syn(1,2); syn(2,3) -> syn(1,3)",
        )
        .unwrap();
        let mut model = Model::new(3);
        let syn = model.add_probability_graph("syn");
        syn.set_reflexive(true);
        syn.set_val(0, 1, 0.9);

        logic.simplify_with(&model).unwrap();
        assert_eq!(logic.len(), 2);
        assert_eq!(
            logic.to_string(),
            "syn(1,2) -> syn(2,1)\nsyn(1,2); syn(2,3) -> syn(1,3)\n"
        );
    }

    #[test]
    fn test_simplify_with_hard_graph() {
        let mut logic = Logic::parse("hyp(1,2) -> syn(1,2); hyp(2,1)").unwrap();
        let mut model = fixture();
        model.add_specific_graph("syn").set_reflexive(false);
        logic.simplify_with(&model).unwrap();
        assert_eq!(logic.to_string(), "hyp(1,2) -> hyp(2,1)\n");

        let mut unbound = Logic::parse("ant(1,2) -> ant(2,1)").unwrap();
        assert!(matches!(
            unbound.simplify_with(&model),
            Err(LogicError::MissingRelation(_))
        ));
    }

    #[test]
    fn test_add_rule_dedup() {
        let mut logic = Logic::new();
        let hyp = logic.intern_relation("hyp");
        let a = logic.add_rule(&Rule::new([Literal::positive(hyp, 3, 8)], [Literal::positive(hyp, 8, 3)]));
        let b = logic.add_rule(&Rule::new([Literal::positive(hyp, 1, 2)], [Literal::positive(hyp, 2, 1)]));
        assert_eq!(a, b);
        assert_eq!(logic.len(), 1);
        assert!(logic.is_range_restricted());
    }
}
