//! Error types for matrix and LP operations.

use thiserror::Error;

/// Errors raised by [`SparseMatrix`](crate::SparseMatrix) and
/// [`Simplex`](crate::Simplex).
///
/// All of these are structural: they indicate a caller broke a precondition
/// (or built a matrix that is not a covering problem). None of them is a
/// normal "no solution" outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// `add_row` on a row that already holds elements.
    #[error("row {0} already exists")]
    RowExists(usize),
    /// `add_column` on a column that already holds elements.
    #[error("column {0} already exists")]
    ColumnExists(usize),
    /// A row operation referenced a row that is not stored.
    #[error("row {0} is not present")]
    MissingRow(usize),
    /// A column operation referenced a column that is not stored.
    #[error("column {0} is not present")]
    MissingColumn(usize),
    /// `restitch` with nothing left to restore.
    #[error("restitch called with an empty undo log")]
    EmptyUndoLog,
    /// Division of a row by (almost) zero.
    #[error("cannot divide row {row} by {divisor}")]
    ZeroDivisor {
        /// Row being normalised
        row: usize,
        /// Offending divisor
        divisor: f64,
    },
    /// No row passed the ratio test for the entering column: the dual is
    /// unbounded, so the covering constraints cannot all be met.
    #[error("no pivot row for entering column {col}")]
    NoPivotRow {
        /// Entering column
        col: usize,
    },
    /// Pivot budget exhausted.
    #[error("simplex iteration limit {0} reached")]
    IterationLimit(usize),
}

/// Result type for matrix operations.
pub type Result<T> = std::result::Result<T, MathError>;
