//! Property-based tests for the covering-LP simplex
//!
//! This module tests:
//! - termination on every valid covering problem
//! - non-negativity and feasibility of the returned values
//! - agreement between the reported cost and the solution values

use oxirel_math::{COST_COL, Simplex, SparseMatrix, is_covered};
use proptest::prelude::*;
use rustc_hash::FxHashMap;

/// Strategy for covering problems: each row is (cost in tenths, column mask).
fn cover_strategy() -> impl Strategy<Value = Vec<(u32, u8)>> {
    prop::collection::vec((1u32..100, 1u8..64), 1..10)
}

fn build(rows: &[(u32, u8)]) -> (SparseMatrix, f64) {
    let mut m = SparseMatrix::new();
    for (k, &(cost, mask)) in rows.iter().enumerate() {
        let row = k + 1;
        m.set_elem_val(row, COST_COL, f64::from(cost) / 10.0);
        for bit in 0..6 {
            if mask & (1 << bit) != 0 {
                m.set_elem(row, bit + 1);
            }
        }
    }
    // A row covering every column keeps the problem feasible.
    let full_cost = 25.0;
    let full = rows.len() + 1;
    m.set_elem_val(full, COST_COL, full_cost);
    for col in 1..=6 {
        m.set_elem(full, col);
    }
    (m, full_cost)
}

proptest! {
    /// Simplex terminates with a feasible, non-negative solution
    #[test]
    fn simplex_solution_is_feasible(rows in cover_strategy()) {
        let (m, _) = build(&rows);
        let mut lp = Simplex::new();
        let cost = lp.simplex_solve(&m);
        prop_assert!(cost.is_ok());
        prop_assert!(lp.soln().values().all(|&x| x >= 0.0));
        prop_assert!(is_covered(&m, &FxHashMap::default(), lp.soln(), 1e-7));
    }

    /// Reported cost equals Σ cost · x and never exceeds the all-covering row
    #[test]
    fn simplex_cost_matches_solution(rows in cover_strategy()) {
        let (m, full_cost) = build(&rows);
        let mut lp = Simplex::new();
        let cost = lp.simplex_solve(&m).unwrap();
        let recomputed: f64 = lp.soln().iter().map(|(&r, &x)| m.cost(r) * x).sum();
        prop_assert!((cost - recomputed).abs() < 1e-6);
        prop_assert!(cost >= -1e-9);
        prop_assert!(cost <= full_cost + 1e-9);
    }

    /// The LP bound never exceeds the cost of taking every row
    #[test]
    fn simplex_is_a_lower_bound(rows in cover_strategy()) {
        let (m, _) = build(&rows);
        let mut lp = Simplex::new();
        let cost = lp.simplex_solve(&m).unwrap();
        let all_rows: f64 = m.row_ids().map(|r| m.cost(r)).sum();
        prop_assert!(cost <= all_rows + 1e-9);
    }
}
