//! Property-based tests for oxirel-math
//!
//! Exercises matrix bookkeeping invariants and LP feasibility on random
//! covering problems.

mod simplex_properties;
mod sparse_properties;
