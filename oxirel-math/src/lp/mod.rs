//! Linear Programming over sparse covering matrices.

pub mod simplex;
pub mod sparse;

pub use simplex::{Simplex, SimplexConfig, SimplexStats};
pub use sparse::{COST_COL, ColId, RowId, SparseMatrix};
