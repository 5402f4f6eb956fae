//! Property-based tests for consistency checking
//!
//! This module tests:
//! - violation enumeration agrees with a brute-force check
//! - currently violated ground clauses match the violations one to one
//! - component decomposition partitions the universe and keeps every link

use oxirel_logic::{GroundScope, Logic, Model};
use proptest::prelude::*;

const N: usize = 4;

fn probabilities() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.05f64..0.95, N * N)
}

fn probability_model(ps: &[f64]) -> Model {
    let mut model = Model::new(N);
    let hyp = model.add_probability_graph("hyp");
    hyp.set_base_val(0.02);
    for (k, &p) in ps.iter().enumerate() {
        hyp.set_val(k / N, k % N, p);
    }
    model
}

fn sparse_model(edges: &[(usize, usize)]) -> Model {
    let mut model = Model::new(6);
    let hyp = model.add_probability_graph("hyp");
    for &(i, j) in edges {
        hyp.set_val(i, j, 0.9);
    }
    model
}

proptest! {
    /// consist_check counts exactly the transitivity violations
    #[test]
    fn violations_match_brute_force(ps in probabilities()) {
        let model = probability_model(&ps);
        let logic = Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap();
        let hyp = model.relation_id("hyp").unwrap();
        let mut expected = 0;
        for x in 0..N {
            for y in 0..N {
                for z in 0..N {
                    if model.is_connected(hyp, x, y)
                        && model.is_connected(hyp, y, z)
                        && !model.is_connected(hyp, x, z)
                    {
                        expected += 1;
                    }
                }
            }
        }
        prop_assert_eq!(logic.consist_check(&model, |_| {}).unwrap(), expected);
    }

    /// Violated ground clauses and violations correspond one to one
    #[test]
    fn violated_clauses_match_violations(ps in probabilities()) {
        let model = probability_model(&ps);
        let logic = Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap();
        let clauses = logic.ground_clauses(&model, GroundScope::NearViolated(0)).unwrap();
        prop_assert!(clauses.iter().all(|c| !c.is_satisfied(&model)));
        prop_assert_eq!(clauses.len(), logic.violations(&model).unwrap().len());
    }

    /// Components partition the elements and preserve every link
    #[test]
    fn components_partition(edges in prop::collection::vec((0usize..6, 0usize..6), 0..8)) {
        let model = sparse_model(&edges);
        let parts = model.component_split();
        let mut elements: Vec<usize> = parts.iter().flat_map(|c| c.elements.clone()).collect();
        elements.sort_unstable();
        prop_assert_eq!(elements, (0..6).collect::<Vec<_>>());

        let total: usize = model.graphs().iter().map(|g| g.link_count()).sum();
        let split: usize = parts
            .iter()
            .map(|c| c.model.graphs().iter().map(|g| g.link_count()).sum::<usize>())
            .sum();
        prop_assert_eq!(total, split);

        for part in &parts {
            for local in part.model.flippable_edges() {
                let global = part.global_edge(local);
                prop_assert_eq!(
                    part.model.is_connected_id(local),
                    model.is_connected_id(global)
                );
            }
        }
    }
}
