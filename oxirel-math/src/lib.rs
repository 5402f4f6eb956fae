//! OxiRel Math - Sparse Matrices and Linear Programming
//!
//! This crate provides the numeric foundation for the OxiRel consistency
//! solvers:
//! - [`SparseMatrix`]: row/column indexed sparse matrix of `f64` with a
//!   reversible row/column removal log ("stitching")
//! - [`Simplex`]: LP relaxation of covering problems, solved through the
//!   dual so that the slack basis is feasible from the start
//!
//! # Examples
//!
//! ```
//! use oxirel_math::{COST_COL, Simplex, SparseMatrix};
//!
//! // Two sets (rows) covering two elements (columns 1 and 2).
//! let mut m = SparseMatrix::new();
//! m.set_elem_val(10, COST_COL, 3.0);
//! m.set_elem(10, 1);
//! m.set_elem(10, 2);
//! m.set_elem_val(11, COST_COL, 2.0);
//! m.set_elem(11, 1);
//!
//! let mut lp = Simplex::new();
//! let cost = lp.simplex_solve(&m).unwrap();
//! assert!((cost - 3.0).abs() < 1e-9);
//! assert!((lp.value(10) - 1.0).abs() < 1e-9);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod lp;

pub use error::{MathError, Result};
pub use lp::simplex::{Simplex, SimplexConfig, SimplexStats, is_covered};
pub use lp::sparse::{COST_COL, ColId, RowId, SparseMatrix};
