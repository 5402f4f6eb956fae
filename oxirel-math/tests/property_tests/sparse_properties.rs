//! Property-based tests for SparseMatrix
//!
//! This module tests:
//! - row/column index symmetry after arbitrary edits
//! - exact restoration by restitch after unstitch/select

use oxirel_math::SparseMatrix;
use proptest::prelude::*;

/// Strategy for a batch of `(row, col, value)` writes; value 0 means removal.
fn edits_strategy() -> impl Strategy<Value = Vec<(usize, usize, i32)>> {
    prop::collection::vec((0usize..8, 0usize..8, -3i32..4), 0..60)
}

fn build(edits: &[(usize, usize, i32)]) -> SparseMatrix {
    let mut m = SparseMatrix::new();
    for &(r, c, v) in edits {
        if v == 0 {
            m.remove_elem(r, c);
        } else if v == 1 {
            m.set_elem(r, c);
        } else {
            m.set_elem_val(r, c, f64::from(v));
        }
    }
    m
}

fn symmetric(m: &SparseMatrix) -> bool {
    (0..8).all(|i| {
        (0..8).all(|j| {
            let in_row = m.row_indices(i).is_some_and(|s| s.contains(&j));
            let in_col = m.col_indices(j).is_some_and(|s| s.contains(&i));
            m.has_elem(i, j) == in_row && in_row == in_col
        })
    })
}

proptest! {
    /// Index maps and value store agree after any edit sequence
    #[test]
    fn edits_keep_indices_symmetric(edits in edits_strategy()) {
        let m = build(&edits);
        prop_assert!(m.is_ok());
        prop_assert!(symmetric(&m));
    }

    /// unstitch_row followed by restitch is the identity
    #[test]
    fn unstitch_restitch_is_identity(edits in edits_strategy(), row in 0usize..8) {
        let mut m = build(&edits);
        let before = m.clone();
        if m.unstitch_row(row).is_ok() {
            prop_assert!(m.is_ok());
            prop_assert!(symmetric(&m));
            prop_assert!(m.row_indices(row).is_none());
            m.restitch().unwrap();
        }
        prop_assert_eq!(&m, &before);
        prop_assert_eq!(m.stitch_depth(), 0);
    }

    /// A stack of mixed removals unwinds back to the original matrix
    #[test]
    fn nested_stitching_unwinds(
        edits in edits_strategy(),
        ops in prop::collection::vec((0u8..3, 0usize..8), 0..6)
    ) {
        let mut m = build(&edits);
        let before = m.clone();
        let mut applied = 0;
        for (kind, idx) in ops {
            let res = match kind {
                0 => m.unstitch_row(idx),
                1 => m.unstitch_col(idx),
                _ => m.select_row(idx),
            };
            if res.is_ok() {
                applied += 1;
                prop_assert!(m.is_ok());
                prop_assert!(symmetric(&m));
            }
        }
        prop_assert_eq!(m.stitch_depth(), applied);
        for _ in 0..applied {
            m.restitch().unwrap();
        }
        prop_assert_eq!(&m, &before);
    }
}
