//! Property-based tests for oxirel-opt
//!
//! Covers exact solvers against exhaustive search and the consistency of
//! every heuristic result.

mod solver_properties;
