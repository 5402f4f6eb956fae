//! OxiRel Opt - Consistency Reconciliation Solvers
//!
//! Finds the cheapest set of edge flips that turns the most likely hard
//! reading of a probabilistic relation model into one that satisfies a
//! [`Logic`](oxirel_logic::Logic):
//! - [`ConsistProblem`]: the 0/1 integer program over ground clauses
//! - exact and heuristic solvers in [`solvers`], all implementing
//!   [`ConsistencySolver`]
//! - [`Process`]: runs a solver on a worker thread with cooperative
//!   pause, resume and cancellation through [`SolveControl`]
//! - [`SolverConfig`]: YAML-loadable configuration of every solver
//! - [`solve_by_components`]: independent solves per connected component
//!
//! # Examples
//!
//! ```
//! use oxirel_logic::{Logic, Model};
//! use oxirel_opt::{ConsistProblem, ConsistSolver, ConsistencySolver, SolveControl};
//!
//! let logic = Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap();
//! let mut model = Model::new(3);
//! let hyp = model.add_probability_graph("hyp");
//! hyp.set_base_val(0.02);
//! hyp.set_val(0, 1, 0.9);
//! hyp.set_val(1, 2, 0.6);
//!
//! let problem = ConsistProblem::new(logic, model).unwrap();
//! let mut solver = ConsistSolver::new(problem);
//! let solution = solver.solve(&SolveControl::new()).unwrap();
//!
//! // Dropping the weak link (1, 2) is cheaper than asserting (0, 2).
//! assert_eq!(solution.flips.len(), 1);
//! assert!(solution.is_optimal());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod decompose;
pub mod error;
pub mod problem;
pub mod process;
pub mod solution;
pub mod solvers;

pub use config::{SolverConfig, SolverKind};
pub use decompose::{is_decomposable, solve_by_components};
pub use error::{Result, SolveError};
pub use problem::{
    Base, ClauseSet, ConsistProblem, PERTURBATION_SIZE, ProblemConfig, ProblemMatrix,
    ProblemStats, perturbation,
};
pub use process::{Process, ProcessState, ProgressListener, SolveControl};
pub use solution::{ConsistencySolver, Solution, SolutionStatus};
pub use solvers::{
    ApproxConsistSolver, ConsistSolver, Constructor, GreedySat, GreedySets, GrowingSolver,
    ResFreeSolver, SetBnB,
};
