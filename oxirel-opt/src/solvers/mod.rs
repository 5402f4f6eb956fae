//! Consistency solvers.
//!
//! - [`ConsistSolver`]: exact LP-based branch and bound over the full matrix
//! - [`ApproxConsistSolver`]: one LP relaxation, rounding and row pruning
//! - [`GrowingSolver`] / [`ResFreeSolver`]: lazy clause generation around an
//!   inner matrix solver
//! - [`GreedySat`]: local search over ground clauses
//! - [`Constructor`]: node-by-node construction with greedy or A* search
//! - [`SetBnB`] / [`GreedySets`]: partition search for equivalence-like
//!   relations

pub mod approx;
pub mod consist;
pub mod constructor;
pub mod greedy_sat;
pub mod greedy_sets;
pub mod growing;
pub mod set_bnb;

pub use approx::{ApproxConfig, ApproxConsistSolver, ApproxStats, RemovalOrder, approx_cover};
pub use consist::{BranchBound, BranchBoundConfig, BranchBoundStats, ConsistSolver};
pub use constructor::{
    Constructor, ConstructorConfig, ConstructorStats, NodeOrder, SearchStrategy, node_order,
};
pub use greedy_sat::{GreedySat, GreedySatConfig, GreedySatStats};
pub use greedy_sets::{GreedySets, GreedySetsConfig};
pub use growing::{GrowingConfig, GrowingSolver, GrowingStats, ResFreeSolver};
pub use set_bnb::{SetBnB, SetBnbConfig, SetBnbStats};
