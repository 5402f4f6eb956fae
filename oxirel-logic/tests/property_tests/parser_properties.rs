//! Property-based tests for the rule-file parser
//!
//! This module tests:
//! - printing a parsed rule and parsing it again preserves its meaning
//! - canonical forms are fixpoints

use oxirel_logic::{Logic, Model};
use proptest::prelude::*;

const RELATIONS: [&str; 2] = ["hyp", "syn"];

fn literal_strategy() -> impl Strategy<Value = String> {
    (0usize..2, any::<bool>(), 1u32..4, 1u32..4).prop_map(|(rel, neg, a, b)| {
        format!("{}{}({},{})", if neg { "!" } else { "" }, RELATIONS[rel], a, b)
    })
}

fn rule_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(literal_strategy(), 0..3),
        prop::collection::vec(literal_strategy(), 0..3),
    )
        .prop_filter("rule needs a literal", |(p, c)| !p.is_empty() || !c.is_empty())
        .prop_map(|(p, c)| format!("{} -> {}", p.join("; "), c.join("; ")))
}

fn model_strategy() -> impl Strategy<Value = Model> {
    (
        prop::collection::vec(any::<bool>(), 9),
        prop::collection::vec(any::<bool>(), 9),
    )
        .prop_map(|(hyp_edges, syn_edges)| {
            let mut model = Model::new(3);
            for (name, edges) in RELATIONS.iter().zip([hyp_edges, syn_edges]) {
                let g = model.add_specific_graph(name);
                for (k, on) in edges.into_iter().enumerate() {
                    if on {
                        g.add(k / 3, k % 3);
                    }
                }
            }
            model
        })
}

proptest! {
    /// A printed rule parses back to a rule with the same violations
    #[test]
    fn display_round_trip_preserves_meaning(text in rule_strategy(), model in model_strategy()) {
        let logic = Logic::parse(&text).unwrap();
        let printed = logic.to_string();
        let reparsed = Logic::parse(&printed).unwrap();
        prop_assert_eq!(reparsed.len(), 1);
        prop_assert_eq!(
            logic.consist_check(&model, |_| {}).unwrap(),
            reparsed.consist_check(&model, |_| {}).unwrap()
        );
    }

    /// Canonicalising a canonical rule changes nothing
    #[test]
    fn canonical_is_fixpoint(text in rule_strategy()) {
        let logic = Logic::parse(&text).unwrap();
        for (_, rule) in logic.rules() {
            let canon = rule.canonical();
            prop_assert_eq!(&canon.canonical(), &canon);
            let vars = canon.vars();
            prop_assert_eq!(vars, (1..=canon.max_var()).collect::<Vec<_>>());
        }
    }
}
