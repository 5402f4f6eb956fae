//! Sparse Matrix with Reversible Row Removal.
//!
//! The matrix keeps two index maps in lock-step (`rows: row -> {col}` and
//! `cols: col -> {row}`) plus a value store keyed by `(row, col)`. Column
//! [`COST_COL`] is reserved for the per-row cost coefficient.
//!
//! ## Stitching
//!
//! Branch-and-bound needs to "pretend a row is gone" and later restore it
//! exactly. [`SparseMatrix::unstitch_row`], [`SparseMatrix::unstitch_col`] and
//! [`SparseMatrix::select_row`] detach elements and push an entry on an undo
//! log; [`SparseMatrix::restitch`] pops exactly one entry and reattaches it.
//! Restitching must happen in reverse order of unstitching.
//!
//! ## Invariants
//!
//! - `has_elem(i, j) == (j ∈ rows[i]) == (i ∈ cols[j])`
//! - no stored row or column index set is empty
//! - stored values are never (near) zero

use crate::error::{MathError, Result};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// Row identifier.
pub type RowId = usize;
/// Column identifier.
pub type ColId = usize;

/// Column holding the cost coefficient of every row.
pub const COST_COL: ColId = 0;

/// Values with a smaller magnitude are dropped to keep the matrix sparse.
const ZERO_TOLERANCE: f64 = 1e-12;

/// One reversible removal.
#[derive(Debug, Clone)]
enum Undo {
    Row {
        row: RowId,
        entries: Vec<(ColId, f64)>,
    },
    Column {
        col: ColId,
        entries: Vec<(RowId, f64)>,
    },
    Select {
        row: RowId,
        entries: Vec<(ColId, f64)>,
        columns: Vec<(ColId, Vec<(RowId, f64)>)>,
    },
}

/// Sparse matrix of doubles indexed by row and column ids.
#[derive(Debug, Clone, Default)]
pub struct SparseMatrix {
    rows: BTreeMap<RowId, BTreeSet<ColId>>,
    cols: BTreeMap<ColId, BTreeSet<RowId>>,
    values: FxHashMap<(RowId, ColId), f64>,
    undo: Vec<Undo>,
}

impl PartialEq for SparseMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.values == other.values
    }
}

impl SparseMatrix {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set element `(i, j)` to 1 unless it already holds a value.
    pub fn set_elem(&mut self, i: RowId, j: ColId) {
        if !self.has_elem(i, j) {
            self.attach(i, j, 1.0);
        }
    }

    /// Set element `(i, j)` to `v`; a (near) zero `v` removes the element.
    pub fn set_elem_val(&mut self, i: RowId, j: ColId, v: f64) {
        if v.abs() < ZERO_TOLERANCE {
            self.detach(i, j);
        } else {
            self.attach(i, j, v);
        }
    }

    /// Remove element `(i, j)`, returning its value if it was stored.
    pub fn remove_elem(&mut self, i: RowId, j: ColId) -> Option<f64> {
        self.detach(i, j)
    }

    /// Whether `(i, j)` holds a value.
    pub fn has_elem(&self, i: RowId, j: ColId) -> bool {
        self.values.contains_key(&(i, j))
    }

    /// Value at `(i, j)`, 0 when absent.
    pub fn elem_val(&self, i: RowId, j: ColId) -> f64 {
        self.values.get(&(i, j)).copied().unwrap_or(0.0)
    }

    /// Insert a whole row. Fails if the row already holds elements.
    pub fn add_row(
        &mut self,
        row: RowId,
        entries: impl IntoIterator<Item = (ColId, f64)>,
    ) -> Result<()> {
        if self.rows.contains_key(&row) {
            return Err(MathError::RowExists(row));
        }
        for (col, v) in entries {
            self.set_elem_val(row, col, v);
        }
        Ok(())
    }

    /// Insert a whole column. Fails if the column already holds elements.
    pub fn add_column(
        &mut self,
        col: ColId,
        entries: impl IntoIterator<Item = (RowId, f64)>,
    ) -> Result<()> {
        if self.cols.contains_key(&col) {
            return Err(MathError::ColumnExists(col));
        }
        for (row, v) in entries {
            self.set_elem_val(row, col, v);
        }
        Ok(())
    }

    /// Permanently remove a row, returning its entries.
    pub fn remove_row(&mut self, row: RowId) -> Vec<(ColId, f64)> {
        let entries = self.row(row);
        for &(col, _) in &entries {
            self.detach(row, col);
        }
        entries
    }

    /// Permanently remove a column, returning its entries.
    pub fn remove_column(&mut self, col: ColId) -> Vec<(RowId, f64)> {
        let entries = self.column(col);
        for &(row, _) in &entries {
            self.detach(row, col);
        }
        entries
    }

    /// Entries of a row in ascending column order.
    pub fn row(&self, row: RowId) -> Vec<(ColId, f64)> {
        self.rows
            .get(&row)
            .map(|set| set.iter().map(|&c| (c, self.elem_val(row, c))).collect())
            .unwrap_or_default()
    }

    /// Entries of a column in ascending row order.
    pub fn column(&self, col: ColId) -> Vec<(RowId, f64)> {
        self.cols
            .get(&col)
            .map(|set| set.iter().map(|&r| (r, self.elem_val(r, col))).collect())
            .unwrap_or_default()
    }

    /// Column indices stored in a row.
    pub fn row_indices(&self, row: RowId) -> Option<&BTreeSet<ColId>> {
        self.rows.get(&row)
    }

    /// Row indices stored in a column.
    pub fn col_indices(&self, col: ColId) -> Option<&BTreeSet<RowId>> {
        self.cols.get(&col)
    }

    /// Stored row ids, ascending.
    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows.keys().copied()
    }

    /// Stored column ids, ascending.
    pub fn col_ids(&self) -> impl Iterator<Item = ColId> + '_ {
        self.cols.keys().copied()
    }

    /// Stored column ids other than [`COST_COL`].
    pub fn constraint_cols(&self) -> impl Iterator<Item = ColId> + '_ {
        self.col_ids().filter(|&c| c != COST_COL)
    }

    /// Number of stored rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of stored columns (including the cost column).
    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    /// Number of stored elements.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Whether no element is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cost coefficient of a row.
    pub fn cost(&self, row: RowId) -> f64 {
        self.elem_val(row, COST_COL)
    }

    /// Whether the non-cost columns of `r1` are a subset of those of `r2`.
    pub fn row_subset(&self, r1: RowId, r2: RowId) -> bool {
        let empty = BTreeSet::new();
        let a = self.rows.get(&r1).unwrap_or(&empty);
        let b = self.rows.get(&r2).unwrap_or(&empty);
        a.iter().filter(|&&c| c != COST_COL).all(|c| b.contains(c))
    }

    /// Whether the rows of column `c1` are a subset of those of `c2`.
    pub fn col_subset(&self, c1: ColId, c2: ColId) -> bool {
        let empty = BTreeSet::new();
        let a = self.cols.get(&c1).unwrap_or(&empty);
        let b = self.cols.get(&c2).unwrap_or(&empty);
        a.is_subset(b)
    }

    /// Sum of a column's values.
    pub fn col_sum(&self, col: ColId) -> f64 {
        self.cols
            .get(&col)
            .map(|set| set.iter().map(|&r| self.elem_val(r, col)).sum())
            .unwrap_or(0.0)
    }

    /// Sum of a row's values, excluding the cost column.
    pub fn row_sum(&self, row: RowId) -> f64 {
        self.rows
            .get(&row)
            .map(|set| {
                set.iter()
                    .filter(|&&c| c != COST_COL)
                    .map(|&c| self.elem_val(row, c))
                    .sum()
            })
            .unwrap_or(0.0)
    }

    /// Minimum stored value of a row outside the cost column.
    pub fn find_min_row_val(&self, row: RowId) -> Option<f64> {
        self.find_min_row_idx(row).map(|(v, _)| v)
    }

    /// Minimum stored value of a row outside the cost column, together with
    /// every column achieving it (ascending).
    pub fn find_min_row_idx(&self, row: RowId) -> Option<(f64, Vec<ColId>)> {
        let set = self.rows.get(&row)?;
        let mut best: Option<(f64, Vec<ColId>)> = None;
        for &col in set.iter().filter(|&&c| c != COST_COL) {
            let v = self.elem_val(row, col);
            let lower = match &best {
                None => true,
                Some((min, _)) => v < *min - ZERO_TOLERANCE,
            };
            if lower {
                best = Some((v, vec![col]));
            } else if let Some((min, idx)) = &mut best
                && (v - *min).abs() <= ZERO_TOLERANCE
            {
                idx.push(col);
            }
        }
        best
    }

    /// Divide every element of `row` by `divisor`.
    pub fn divide_row_by(&mut self, row: RowId, divisor: f64) -> Result<()> {
        if divisor.abs() < ZERO_TOLERANCE {
            return Err(MathError::ZeroDivisor { row, divisor });
        }
        let cols: Vec<ColId> = self
            .rows
            .get(&row)
            .ok_or(MathError::MissingRow(row))?
            .iter()
            .copied()
            .collect();
        for col in cols {
            let v = self.elem_val(row, col) / divisor;
            self.set_elem_val(row, col, v);
        }
        Ok(())
    }

    /// `dst -= factor * src`, dropping entries that cancel out.
    pub fn subtract_row_from_row(&mut self, src: RowId, factor: f64, dst: RowId) -> Result<()> {
        let entries = self.row(src);
        if entries.is_empty() {
            return Err(MathError::MissingRow(src));
        }
        for (col, v) in entries {
            let updated = self.elem_val(dst, col) - factor * v;
            self.set_elem_val(dst, col, updated);
        }
        Ok(())
    }

    /// Temporarily remove a row from the matrix.
    pub fn unstitch_row(&mut self, row: RowId) -> Result<()> {
        if !self.rows.contains_key(&row) {
            return Err(MathError::MissingRow(row));
        }
        let entries = self.remove_row(row);
        self.undo.push(Undo::Row { row, entries });
        Ok(())
    }

    /// Temporarily remove a column from the matrix.
    pub fn unstitch_col(&mut self, col: ColId) -> Result<()> {
        if !self.cols.contains_key(&col) {
            return Err(MathError::MissingColumn(col));
        }
        let entries = self.remove_column(col);
        self.undo.push(Undo::Column { col, entries });
        Ok(())
    }

    /// Temporarily remove a row together with every column it covers
    /// (positive entry outside the cost column). One `restitch` undoes both.
    pub fn select_row(&mut self, row: RowId) -> Result<()> {
        if !self.rows.contains_key(&row) {
            return Err(MathError::MissingRow(row));
        }
        let entries = self.remove_row(row);
        let columns = entries
            .iter()
            .filter(|&&(c, v)| c != COST_COL && v > 0.0)
            .map(|&(c, _)| (c, self.remove_column(c)))
            .collect();
        self.undo.push(Undo::Select {
            row,
            entries,
            columns,
        });
        Ok(())
    }

    /// Undo the most recent unstitch/select.
    pub fn restitch(&mut self) -> Result<()> {
        match self.undo.pop().ok_or(MathError::EmptyUndoLog)? {
            Undo::Row { row, entries } => {
                for (col, v) in entries {
                    self.attach(row, col, v);
                }
            }
            Undo::Column { col, entries } => {
                for (row, v) in entries {
                    self.attach(row, col, v);
                }
            }
            Undo::Select {
                row,
                entries,
                columns,
            } => {
                for (col, col_entries) in columns.into_iter().rev() {
                    for (r, v) in col_entries {
                        self.attach(r, col, v);
                    }
                }
                for (col, v) in entries {
                    self.attach(row, col, v);
                }
            }
        }
        Ok(())
    }

    /// Number of pending restitches.
    pub fn stitch_depth(&self) -> usize {
        self.undo.len()
    }

    /// Deep copy of rows, columns and values; the undo log is not copied.
    pub fn create_copy(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            cols: self.cols.clone(),
            values: self.values.clone(),
            undo: Vec::new(),
        }
    }

    /// Verify that rows, columns and values agree.
    pub fn is_ok(&self) -> bool {
        let row_count: usize = self.rows.values().map(BTreeSet::len).sum();
        let col_count: usize = self.cols.values().map(BTreeSet::len).sum();
        if row_count != self.values.len() || col_count != self.values.len() {
            return false;
        }
        if self.rows.values().any(BTreeSet::is_empty) || self.cols.values().any(BTreeSet::is_empty)
        {
            return false;
        }
        self.values.iter().all(|(&(r, c), v)| {
            v.abs() >= ZERO_TOLERANCE
                && self.rows.get(&r).is_some_and(|s| s.contains(&c))
                && self.cols.get(&c).is_some_and(|s| s.contains(&r))
        })
    }

    fn attach(&mut self, i: RowId, j: ColId, v: f64) {
        self.values.insert((i, j), v);
        self.rows.entry(i).or_default().insert(j);
        self.cols.entry(j).or_default().insert(i);
    }

    fn detach(&mut self, i: RowId, j: ColId) -> Option<f64> {
        let v = self.values.remove(&(i, j))?;
        if let Some(set) = self.rows.get_mut(&i) {
            set.remove(&j);
            if set.is_empty() {
                self.rows.remove(&i);
            }
        }
        if let Some(set) = self.cols.get_mut(&j) {
            set.remove(&i);
            if set.is_empty() {
                self.cols.remove(&j);
            }
        }
        Some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SparseMatrix {
        let mut m = SparseMatrix::new();
        m.set_elem_val(1, COST_COL, 2.0);
        m.set_elem(1, 1);
        m.set_elem(1, 2);
        m.set_elem_val(2, COST_COL, 1.0);
        m.set_elem(2, 2);
        m.set_elem_val(3, COST_COL, 4.0);
        m.set_elem(3, 1);
        m.set_elem(3, 2);
        m.set_elem(3, 3);
        m
    }

    #[test]
    fn test_set_and_remove() {
        let mut m = SparseMatrix::new();
        m.set_elem(4, 7);
        assert_eq!(m.elem_val(4, 7), 1.0);
        m.set_elem(4, 7);
        assert_eq!(m.elem_val(4, 7), 1.0);
        m.set_elem_val(4, 7, -2.5);
        assert_eq!(m.elem_val(4, 7), -2.5);
        assert_eq!(m.remove_elem(4, 7), Some(-2.5));
        assert!(!m.has_elem(4, 7));
        assert!(m.row_indices(4).is_none());
        assert!(m.col_indices(7).is_none());
        assert!(m.is_ok());
    }

    #[test]
    fn test_add_existing_row_fails() {
        let mut m = sample();
        assert_eq!(m.add_row(2, [(5, 1.0)]), Err(MathError::RowExists(2)));
        assert!(m.add_row(9, [(5, 1.0)]).is_ok());
        assert_eq!(m.add_column(5, [(1, 1.0)]), Err(MathError::ColumnExists(5)));
    }

    #[test]
    fn test_subsets() {
        let m = sample();
        assert!(m.row_subset(2, 1));
        assert!(m.row_subset(1, 3));
        assert!(!m.row_subset(3, 1));
        assert!(m.col_subset(3, 1));
        assert!(m.col_subset(1, 2));
        assert!(!m.col_subset(2, 1));
    }

    #[test]
    fn test_find_min_row() {
        let mut m = SparseMatrix::new();
        m.set_elem_val(0, COST_COL, -10.0);
        m.set_elem_val(0, 3, -2.0);
        m.set_elem_val(0, 5, 1.0);
        m.set_elem_val(0, 9, -2.0);
        let (v, idx) = m.find_min_row_idx(0).unwrap();
        assert_eq!(v, -2.0);
        assert_eq!(idx, vec![3, 9]);
        assert_eq!(m.find_min_row_val(1), None);
    }

    #[test]
    fn test_row_operations_keep_sparsity() {
        let mut m = SparseMatrix::new();
        m.set_elem_val(1, 0, 4.0);
        m.set_elem_val(1, 1, 2.0);
        m.set_elem_val(2, 0, 2.0);
        m.set_elem_val(2, 1, 1.0);
        m.divide_row_by(1, 2.0).unwrap();
        assert_eq!(m.elem_val(1, 0), 2.0);
        m.subtract_row_from_row(1, 1.0, 2).unwrap();
        assert!(m.row_indices(2).is_none());
        assert!(m.is_ok());
        assert!(m.divide_row_by(1, 0.0).is_err());
    }

    #[test]
    fn test_unstitch_restitch_restores() {
        let mut m = sample();
        let before = m.clone();
        m.unstitch_row(1).unwrap();
        assert!(!m.has_elem(1, 1));
        assert!(!m.col_indices(1).unwrap().contains(&1));
        m.unstitch_col(2).unwrap();
        m.select_row(3).unwrap();
        assert_eq!(m.stitch_depth(), 3);
        assert!(m.is_ok());
        m.restitch().unwrap();
        m.restitch().unwrap();
        m.restitch().unwrap();
        assert_eq!(m, before);
        assert_eq!(m.restitch(), Err(MathError::EmptyUndoLog));
    }

    #[test]
    fn test_select_row_removes_covered_columns() {
        let mut m = sample();
        m.select_row(1).unwrap();
        assert!(m.col_indices(1).is_none());
        assert!(m.col_indices(2).is_none());
        assert!(m.col_indices(3).is_some());
        assert_eq!(m.cost(3), 4.0);
    }

    #[test]
    fn test_create_copy_drops_undo_log() {
        let mut m = sample();
        m.unstitch_row(2).unwrap();
        let copy = m.create_copy();
        assert_eq!(copy, m);
        assert_eq!(copy.stitch_depth(), 0);
    }
}
