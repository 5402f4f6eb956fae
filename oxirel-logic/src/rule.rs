//! Rules over binary relations.
//!
//! A [`Rule`] reads `p1; ...; pk -> c1; ...; cm`: whenever every premise
//! holds, at least one conclusion must hold. As a clause this is
//! `!p1 | ... | !pk | c1 | ... | cm`. Empty premises state a compulsory fact,
//! empty conclusions an integrity constraint.
//!
//! Variables are small positive integers shared between literals. The
//! canonical form numbers them `1..=k`, which is what grounding relies on
//! when it indexes assignments by `var - 1`.
//!
//! ## References
//!
//! - Robinson, "A Machine-Oriented Logic Based on the Resolution Principle"
//!   (JACM 1965) for binary resolution
//! - Plotkin, "A Note on Inductive Generalization" (1970) for θ-subsumption

use crate::model::RelationId;
use smallvec::SmallVec;
use std::fmt;

/// Rule variable.
pub type Var = u32;

/// Rules with more variables are canonicalised by first occurrence only.
pub const MAX_CANONICAL_VARS: usize = 7;

/// `relation(a, b)`; the relation id indexes the owning logic's relation
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom {
    /// Relation id.
    pub relation: RelationId,
    /// Argument variables.
    pub args: [Var; 2],
}

/// Possibly negated atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    /// Atom.
    pub atom: Atom,
    /// Whether the literal is `!atom`.
    pub negated: bool,
}

impl Literal {
    /// `relation(a, b)`.
    pub fn positive(relation: RelationId, a: Var, b: Var) -> Self {
        Self {
            atom: Atom {
                relation,
                args: [a, b],
            },
            negated: false,
        }
    }

    /// `!relation(a, b)`.
    pub fn negative(relation: RelationId, a: Var, b: Var) -> Self {
        Self {
            negated: true,
            ..Self::positive(relation, a, b)
        }
    }

    /// Same atom, opposite sign.
    pub fn complement(self) -> Self {
        Self {
            negated: !self.negated,
            ..self
        }
    }

    fn map_vars(self, f: impl Fn(Var) -> Var) -> Self {
        let [a, b] = self.atom.args;
        Self {
            atom: Atom {
                relation: self.atom.relation,
                args: [f(a), f(b)],
            },
            negated: self.negated,
        }
    }
}

/// Premise literals of a rule.
pub type Premises = SmallVec<[Literal; 4]>;

/// Conclusion literals of a rule.
pub type Conclusions = SmallVec<[Literal; 2]>;

/// Horn-like rule `premises -> conclusions`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rule {
    premises: Premises,
    conclusions: Conclusions,
}

impl Rule {
    /// Build a rule from its two sides.
    pub fn new(
        premises: impl IntoIterator<Item = Literal>,
        conclusions: impl IntoIterator<Item = Literal>,
    ) -> Self {
        Self {
            premises: premises.into_iter().collect(),
            conclusions: conclusions.into_iter().collect(),
        }
    }

    /// Literals that must all hold to trigger the rule.
    pub fn premises(&self) -> &[Literal] {
        &self.premises
    }

    /// Literals of which one must hold once the rule triggers.
    pub fn conclusions(&self) -> &[Literal] {
        &self.conclusions
    }

    /// Number of premises.
    pub fn premise_count(&self) -> usize {
        self.premises.len()
    }

    /// Premises then conclusions.
    pub fn literals(&self) -> impl Iterator<Item = &Literal> {
        self.premises.iter().chain(self.conclusions.iter())
    }

    /// Distinct variables, ascending.
    pub fn vars(&self) -> Vec<Var> {
        let mut vars: Vec<Var> = self.literals().flat_map(|l| l.atom.args).collect();
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    /// Largest variable, 0 for a rule without literals.
    pub fn max_var(&self) -> Var {
        self.literals()
            .flat_map(|l| l.atom.args)
            .max()
            .unwrap_or(0)
    }

    /// Canonical form: variables numbered `1..=k`, literals sorted and
    /// deduplicated. For up to [`MAX_CANONICAL_VARS`] variables this is the
    /// smallest form over all variable permutations, so isomorphic rules
    /// share one canonical form.
    pub fn canonical(&self) -> Rule {
        let mut base = self.renumbered();
        base.sort_dedup();
        let k = base.max_var() as usize;
        if k > MAX_CANONICAL_VARS {
            let mut again = base.renumbered();
            again.sort_dedup();
            return again;
        }

        // Heap's algorithm over the images of 1..=k.
        let mut perm: Vec<Var> = (1..=k as Var).collect();
        let mut counters = vec![0usize; k];
        let mut best = base.clone();
        let mut i = 1;
        while i < k {
            if counters[i] < i {
                if i % 2 == 0 {
                    perm.swap(0, i);
                } else {
                    perm.swap(counters[i], i);
                }
                let mut candidate = base.relabeled(&perm);
                candidate.sort_dedup();
                if candidate < best {
                    best = candidate;
                }
                counters[i] += 1;
                i = 1;
            } else {
                counters[i] = 0;
                i += 1;
            }
        }
        best
    }

    fn relabeled(&self, perm: &[Var]) -> Rule {
        let image = |v: Var| perm[v as usize - 1];
        Rule {
            premises: self.premises.iter().map(|l| l.map_vars(image)).collect(),
            conclusions: self.conclusions.iter().map(|l| l.map_vars(image)).collect(),
        }
    }

    fn renumbered(&self) -> Rule {
        let mut order: SmallVec<[Var; 8]> = SmallVec::new();
        for l in self.literals() {
            for v in l.atom.args {
                if !order.contains(&v) {
                    order.push(v);
                }
            }
        }
        let rename = |v: Var| {
            order
                .iter()
                .position(|&o| o == v)
                .map_or(v, |p| p as Var + 1)
        };
        Rule {
            premises: self.premises.iter().map(|l| l.map_vars(rename)).collect(),
            conclusions: self.conclusions.iter().map(|l| l.map_vars(rename)).collect(),
        }
    }

    fn sort_dedup(&mut self) {
        self.premises.sort_unstable();
        self.premises.dedup();
        self.conclusions.sort_unstable();
        self.conclusions.dedup();
    }

    /// Whether every instantiation is satisfied: a premise repeated as a
    /// conclusion, or complementary literals on one side.
    pub fn is_tautology(&self) -> bool {
        let complementary = |side: &[Literal]| side.iter().any(|l| side.contains(&l.complement()));
        self.premises.iter().any(|p| self.conclusions.contains(p))
            || complementary(self.premises.as_slice())
            || complementary(self.conclusions.as_slice())
    }

    /// Canonical form, or `None` for a tautology.
    pub fn simplify(&self) -> Option<Rule> {
        let rule = self.canonical();
        (!rule.is_tautology()).then_some(rule)
    }

    /// [`Rule::simplify`] under a prior: `fixed` gives the truth value an
    /// atom takes under every instantiation, or `None` when it varies.
    ///
    /// Premises fixed true and conclusions fixed false are dropped. A premise
    /// fixed false or a conclusion fixed true satisfies every instantiation
    /// and yields `None`. A rule that would lose every literal is kept whole.
    pub fn simplify_with(&self, fixed: impl Fn(&Atom) -> Option<bool>) -> Option<Rule> {
        let truth = |l: &Literal| fixed(&l.atom).map(|v| v != l.negated);
        if self.premises.iter().any(|p| truth(p) == Some(false))
            || self.conclusions.iter().any(|c| truth(c) == Some(true))
        {
            return None;
        }
        let premises: Premises = self
            .premises
            .iter()
            .filter(|&p| truth(p).is_none())
            .copied()
            .collect();
        let conclusions: Conclusions = self
            .conclusions
            .iter()
            .filter(|&c| truth(c).is_none())
            .copied()
            .collect();
        if premises.is_empty() && conclusions.is_empty() {
            return self.simplify();
        }
        Rule {
            premises,
            conclusions,
        }
        .simplify()
    }

    /// Whether every variable occurs in a positive premise, which bounds
    /// every violating instantiation to connected pairs.
    pub fn is_range_restricted(&self) -> bool {
        self.vars().iter().all(|v| {
            self.premises
                .iter()
                .any(|p| !p.negated && p.atom.args.contains(v))
        })
    }

    /// θ-subsumption: some substitution maps every premise of `self` onto a
    /// premise of `other` and every conclusion onto a conclusion.
    pub fn subsumes(&self, other: &Rule) -> bool {
        let goals: Vec<(Literal, &[Literal])> = self
            .premises
            .iter()
            .map(|&l| (l, other.premises()))
            .chain(self.conclusions.iter().map(|&l| (l, other.conclusions())))
            .collect();
        let mut theta: Vec<(Var, Var)> = Vec::new();
        match_goals(&goals, &mut theta)
    }

    /// Whether some conclusion of `self` unifies with a premise of `other`.
    pub fn can_resolve_with(&self, other: &Rule) -> bool {
        self.conclusions.iter().any(|c| {
            other
                .premises
                .iter()
                .any(|p| p.atom.relation == c.atom.relation && p.negated == c.negated)
        })
    }

    /// First non-tautological resolvent of `self` against `other`.
    pub fn resolve(&self, other: &Rule) -> Option<Rule> {
        self.resolvents(other).into_iter().next()
    }

    /// Every simplified resolvent of a conclusion of `self` against a
    /// premise of `other`, deduplicated.
    pub fn resolvents(&self, other: &Rule) -> Vec<Rule> {
        let offset = self.max_var();
        let shifted = Rule {
            premises: other.premises.iter().map(|l| l.map_vars(|v| v + offset)).collect(),
            conclusions: other
                .conclusions
                .iter()
                .map(|l| l.map_vars(|v| v + offset))
                .collect(),
        };
        let size = (offset + shifted.max_var()) as usize + 1;
        let mut out: Vec<Rule> = Vec::new();
        for (ci, c) in self.conclusions.iter().enumerate() {
            for (pi, p) in shifted.premises.iter().enumerate() {
                if c.atom.relation != p.atom.relation || c.negated != p.negated {
                    continue;
                }
                let mut uf: Vec<Var> = (0..size as Var).collect();
                for k in 0..2 {
                    union(&mut uf, c.atom.args[k], p.atom.args[k]);
                }
                let subst = |v: Var| root(&uf, v);
                let premises = self
                    .premises
                    .iter()
                    .chain(
                        shifted
                            .premises
                            .iter()
                            .enumerate()
                            .filter(|&(k, _)| k != pi)
                            .map(|(_, l)| l),
                    )
                    .map(|l| l.map_vars(subst));
                let conclusions = self
                    .conclusions
                    .iter()
                    .enumerate()
                    .filter(|&(k, _)| k != ci)
                    .map(|(_, l)| l)
                    .chain(shifted.conclusions.iter())
                    .map(|l| l.map_vars(subst));
                if let Some(r) = Rule::new(premises, conclusions).simplify()
                    && !out.contains(&r)
                {
                    out.push(r);
                }
            }
        }
        out
    }

    /// Render with relation names.
    pub fn display<'a>(&'a self, names: &'a [String]) -> RuleDisplay<'a> {
        RuleDisplay { rule: self, names }
    }
}

fn root(uf: &[Var], mut v: Var) -> Var {
    while uf[v as usize] != v {
        v = uf[v as usize];
    }
    v
}

fn union(uf: &mut [Var], a: Var, b: Var) {
    let (ra, rb) = (root(uf, a), root(uf, b));
    if ra != rb {
        uf[ra.max(rb) as usize] = ra.min(rb);
    }
}

fn match_goals(goals: &[(Literal, &[Literal])], theta: &mut Vec<(Var, Var)>) -> bool {
    let Some(((lit, candidates), rest)) = goals.split_first() else {
        return true;
    };
    for cand in candidates.iter() {
        if cand.atom.relation != lit.atom.relation || cand.negated != lit.negated {
            continue;
        }
        let mark = theta.len();
        if bind(theta, lit.atom.args[0], cand.atom.args[0])
            && bind(theta, lit.atom.args[1], cand.atom.args[1])
            && match_goals(rest, theta)
        {
            return true;
        }
        theta.truncate(mark);
    }
    false
}

fn bind(theta: &mut Vec<(Var, Var)>, from: Var, to: Var) -> bool {
    match theta.iter().find(|(f, _)| *f == from) {
        Some(&(_, t)) => t == to,
        None => {
            theta.push((from, to));
            true
        }
    }
}

/// [`Rule`] rendered in rule-file syntax.
pub struct RuleDisplay<'a> {
    rule: &'a Rule,
    names: &'a [String],
}

impl RuleDisplay<'_> {
    fn literal(&self, f: &mut fmt::Formatter<'_>, l: &Literal) -> fmt::Result {
        let name = self
            .names
            .get(l.atom.relation)
            .map_or("?", String::as_str);
        let bang = if l.negated { "!" } else { "" };
        write!(f, "{}{}({},{})", bang, name, l.atom.args[0], l.atom.args[1])
    }

    fn side(&self, f: &mut fmt::Formatter<'_>, side: &[Literal]) -> fmt::Result {
        for (k, l) in side.iter().enumerate() {
            if k > 0 {
                write!(f, "; ")?;
            }
            self.literal(f, l)?;
        }
        Ok(())
    }
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.side(f, self.rule.premises())?;
        if !self.rule.premises().is_empty() {
            write!(f, " ")?;
        }
        write!(f, "->")?;
        if !self.rule.conclusions().is_empty() {
            write!(f, " ")?;
        }
        self.side(f, self.rule.conclusions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HYP: RelationId = 0;
    const SYN: RelationId = 1;
    const NONE: [Literal; 0] = [];

    fn p(a: Var, b: Var) -> Literal {
        Literal::positive(HYP, a, b)
    }

    fn transitivity() -> Rule {
        Rule::new([p(1, 2), p(2, 3)], [p(1, 3)])
    }

    #[test]
    fn test_canonical_renumbers() {
        let rule = Rule::new([p(7, 4), p(4, 9), p(7, 4)], [p(7, 9)]);
        let canon = rule.canonical();
        assert_eq!(canon, transitivity());
        assert_eq!(canon.vars(), vec![1, 2, 3]);
        assert_eq!(canon.canonical(), canon);
    }

    #[test]
    fn test_tautology() {
        assert!(Rule::new([p(1, 2)], [p(1, 2)]).is_tautology());
        assert!(Rule::new([p(1, 2), p(1, 2).complement()], NONE).is_tautology());
        assert!(Rule::new(NONE, [p(1, 2), p(1, 2).complement()]).is_tautology());
        assert!(!transitivity().is_tautology());
        assert!(Rule::new([p(1, 2)], [p(1, 2)]).simplify().is_none());
    }

    #[test]
    fn test_simplify_with_reflexive_prior() {
        let syn = |a, b| Literal::positive(SYN, a, b);
        let reflexive = |atom: &Atom| (atom.args[0] == atom.args[1]).then_some(true);

        let rule = Rule::new([syn(1, 1), syn(1, 2)], [syn(2, 1)]);
        let simplified = rule.simplify_with(reflexive).unwrap();
        assert_eq!(simplified, Rule::new([syn(1, 2)], [syn(2, 1)]));

        assert!(Rule::new([syn(1, 2)], [syn(1, 1)]).simplify_with(reflexive).is_none());
        let irreflexive = Rule::new([syn(1, 2), Literal::negative(SYN, 2, 2)], [syn(2, 1)]);
        assert!(irreflexive.simplify_with(reflexive).is_none());
    }

    #[test]
    fn test_simplify_with_drops_false_conclusions() {
        let empty = |atom: &Atom| (atom.relation == SYN).then_some(false);
        let rule = Rule::new([p(1, 2)], [Literal::positive(SYN, 1, 2), p(2, 1)]);
        assert_eq!(
            rule.simplify_with(empty),
            Some(Rule::new([p(1, 2)], [p(2, 1)]))
        );
        assert_eq!(transitivity().simplify_with(|_| None), Some(transitivity()));

        let only_fixed = Rule::new([p(1, 1)], NONE);
        let always = |_: &Atom| Some(true);
        assert_eq!(only_fixed.simplify_with(always), Some(only_fixed.clone()));
    }

    #[test]
    fn test_range_restricted() {
        assert!(transitivity().is_range_restricted());
        let symmetric = Rule::new([Literal::positive(SYN, 1, 2)], [Literal::positive(SYN, 2, 1)]);
        assert!(symmetric.is_range_restricted());
        assert!(!Rule::new(NONE, [p(1, 1)]).is_range_restricted());
        assert!(!Rule::new([Literal::negative(HYP, 1, 2)], [p(2, 1)]).is_range_restricted());
    }

    #[test]
    fn test_subsumption() {
        let general = Rule::new([p(1, 2)], [p(2, 1)]);
        let specific = Rule::new([p(1, 2), p(2, 3)], [p(2, 1), p(3, 1)]);
        assert!(general.subsumes(&specific));
        assert!(!specific.subsumes(&general));
        let loop_only = Rule::new([p(1, 1)], NONE);
        assert!(!loop_only.subsumes(&Rule::new([p(1, 2)], NONE)));
        assert!(transitivity().subsumes(&transitivity()));
    }

    #[test]
    fn test_resolution() {
        let syn_to_hyp = Rule::new([Literal::positive(SYN, 1, 2)], [p(1, 2)]);
        assert!(syn_to_hyp.can_resolve_with(&transitivity()));
        assert!(!transitivity().can_resolve_with(&Rule::new([Literal::positive(SYN, 1, 2)], NONE)));

        let resolvents = syn_to_hyp.resolvents(&transitivity());
        assert_eq!(resolvents.len(), 2);
        let first = Rule::new([Literal::positive(SYN, 1, 2), p(2, 3)], [p(1, 3)]).canonical();
        assert!(resolvents.contains(&first));
        assert_eq!(syn_to_hyp.resolve(&transitivity()), Some(resolvents[0].clone()));
    }

    #[test]
    fn test_resolution_drops_tautologies() {
        let sym = Rule::new([p(1, 2)], [p(2, 1)]);
        let resolvents = sym.resolvents(&sym);
        assert!(resolvents.is_empty());
    }

    #[test]
    fn test_display() {
        let names = vec!["hyp".to_string(), "syn".to_string()];
        let rule = Rule::new([p(1, 2), Literal::negative(SYN, 2, 3)], [p(1, 3)]);
        assert_eq!(rule.display(&names).to_string(), "hyp(1,2); !syn(2,3) -> hyp(1,3)");
        assert_eq!(Rule::new(NONE, [p(1, 1)]).display(&names).to_string(), "-> hyp(1,1)");
        assert_eq!(Rule::new([p(1, 2)], NONE).display(&names).to_string(), "hyp(1,2) ->");
    }
}
