//! Property-based tests for the consistency solvers
//!
//! This module tests:
//! - branch and bound finds the exhaustive-search optimum
//! - the growing solvers reach the same cost as the full matrix
//! - every successful heuristic result is consistent and no cheaper than
//!   the optimum

use oxirel_logic::{EdgeId, Logic, Model};
use oxirel_opt::{
    ConsistProblem, ConsistSolver, ConsistencySolver, SolveControl, SolverConfig, SolverKind,
};
use proptest::prelude::*;

const N: usize = 4;

fn probabilities() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.05f64..0.95, N * N)
}

fn problem(ps: &[f64]) -> ConsistProblem {
    let mut model = Model::new(N);
    let hyp = model.add_probability_graph("hyp");
    hyp.set_base_val(0.02);
    for (k, &p) in ps.iter().enumerate() {
        hyp.set_val(k / N, k % N, p);
    }
    let logic = Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap();
    ConsistProblem::new(logic, model).unwrap()
}

/// Cheapest consistent flip set by enumeration of every subset.
fn brute_force(problem: &ConsistProblem) -> f64 {
    let edges: Vec<EdgeId> = problem.model().flippable_edges().collect();
    let mut best = f64::INFINITY;
    for mask in 0u32..(1 << edges.len()) {
        let flips: Vec<EdgeId> = edges
            .iter()
            .enumerate()
            .filter(|&(k, _)| mask & (1 << k) != 0)
            .map(|(_, &e)| e)
            .collect();
        let cost = problem.cost_of(&flips);
        if cost < best && problem.is_consistent_with(&flips).unwrap() {
            best = cost;
        }
    }
    best
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Branch and bound matches exhaustive search
    #[test]
    fn branch_bound_is_optimal(ps in probabilities()) {
        let problem = problem(&ps);
        let expected = brute_force(&problem);
        let solution = ConsistSolver::new(problem.clone())
            .solve(&SolveControl::new())
            .unwrap();
        prop_assert!(solution.is_optimal());
        prop_assert!(problem.is_consistent_with(&solution.flips).unwrap());
        prop_assert!((solution.cost - expected).abs() < 1e-6);
    }

    /// Lazy clause generation loses nothing against the full matrix
    #[test]
    fn growing_matches_full_matrix(ps in probabilities()) {
        let config = SolverConfig::default();
        let full = config
            .build_kind(SolverKind::BranchBound, problem(&ps))
            .solve(&SolveControl::new())
            .unwrap();
        for kind in [SolverKind::Growing, SolverKind::ResFree] {
            let solution = config
                .build_kind(kind, problem(&ps))
                .solve(&SolveControl::new())
                .unwrap();
            prop_assert!((solution.cost - full.cost).abs() < 1e-6);
        }
    }

    /// Heuristics either fail explicitly or return a consistent repair
    #[test]
    fn heuristics_are_consistent(ps in probabilities()) {
        let config = SolverConfig::default();
        let optimum = ConsistSolver::new(problem(&ps))
            .solve(&SolveControl::new())
            .unwrap()
            .cost;
        for kind in [
            SolverKind::Approx,
            SolverKind::GreedySat,
            SolverKind::Constructor,
            SolverKind::GreedySets,
        ] {
            let problem = problem(&ps);
            let checker = problem.clone();
            if let Ok(solution) = config.build_kind(kind, problem).solve(&SolveControl::new()) {
                prop_assert!(checker.is_consistent_with(&solution.flips).unwrap());
                prop_assert!(solution.cost >= optimum - 1e-6);
            }
        }
    }
}
