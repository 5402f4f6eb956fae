//! Solver configuration tree.
//!
//! Every section defaults field by field, so a YAML file only needs the
//! values it changes:
//!
//! ```yaml
//! solver: growing
//! growing:
//!   max_iterations: 50
//! branch_bound:
//!   max_nodes: 10000
//! ```

use crate::error::{Result, SolveError};
use crate::problem::{ConsistProblem, ProblemConfig};
use crate::solution::ConsistencySolver;
use crate::solvers::{
    ApproxConfig, ApproxConsistSolver, BranchBoundConfig, ConsistSolver, Constructor,
    ConstructorConfig, GreedySat, GreedySatConfig, GreedySets, GreedySetsConfig, GrowingConfig,
    GrowingSolver, ResFreeSolver, SetBnB, SetBnbConfig,
};
use oxirel_logic::{Logic, Model};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Which solver [`SolverConfig::build`] constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Exact branch and bound over the full matrix.
    #[default]
    BranchBound,
    /// LP rounding.
    Approx,
    /// Lazy clause generation, rebuilding the matrix each iteration.
    Growing,
    /// Lazy clause generation over one persistent matrix.
    ResFree,
    /// Local search.
    GreedySat,
    /// Node-by-node construction.
    Constructor,
    /// Partition branch and bound.
    SetBnb,
    /// Greedy clustering.
    GreedySets,
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverKind::BranchBound => "branch_bound",
            SolverKind::Approx => "approx",
            SolverKind::Growing => "growing",
            SolverKind::ResFree => "res_free",
            SolverKind::GreedySat => "greedy_sat",
            SolverKind::Constructor => "constructor",
            SolverKind::SetBnb => "set_bnb",
            SolverKind::GreedySets => "greedy_sets",
        };
        f.write_str(name)
    }
}

/// Configuration of problem construction and every solver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Solver to build.
    pub solver: SolverKind,
    /// Problem construction.
    pub problem: ProblemConfig,
    /// Exact branch and bound, also used inside the growing solvers.
    pub branch_bound: BranchBoundConfig,
    /// LP rounding, also used inside the growing solvers.
    pub approx: ApproxConfig,
    /// Growing solvers.
    pub growing: GrowingConfig,
    /// Local search.
    pub greedy_sat: GreedySatConfig,
    /// Constructor.
    pub constructor: ConstructorConfig,
    /// Partition branch and bound.
    pub set_bnb: SetBnbConfig,
    /// Greedy clustering.
    pub greedy_sets: GreedySetsConfig,
}

impl SolverConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| SolveError::Config(e.to_string()))
    }

    /// Read and parse a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| SolveError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_yaml_str(&text)?;
        debug!(path = %path.display(), solver = %config.solver, "loaded solver configuration");
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SolveError::Config(e.to_string()))
    }

    /// Problem over `logic` and `model` with the configured construction.
    pub fn problem(&self, logic: Logic, model: Model) -> Result<ConsistProblem> {
        ConsistProblem::with_config(logic, model, self.problem.clone())
    }

    /// The configured solver over `problem`.
    pub fn build(&self, problem: ConsistProblem) -> Box<dyn ConsistencySolver> {
        self.build_kind(self.solver, problem)
    }

    /// A solver of `kind` over `problem`, configured from this tree.
    pub fn build_kind(
        &self,
        kind: SolverKind,
        problem: ConsistProblem,
    ) -> Box<dyn ConsistencySolver> {
        match kind {
            SolverKind::BranchBound => {
                Box::new(ConsistSolver::with_config(problem, self.branch_bound.clone()))
            }
            SolverKind::Approx => {
                Box::new(ApproxConsistSolver::with_config(problem, self.approx.clone()))
            }
            SolverKind::Growing => Box::new(
                GrowingSolver::with_config(problem, self.growing.clone())
                    .with_inner(self.branch_bound.clone(), self.approx.clone()),
            ),
            SolverKind::ResFree => Box::new(
                ResFreeSolver::with_config(problem, self.growing.clone())
                    .with_inner(self.branch_bound.clone(), self.approx.clone()),
            ),
            SolverKind::GreedySat => {
                Box::new(GreedySat::with_config(problem, self.greedy_sat.clone()))
            }
            SolverKind::Constructor => {
                Box::new(Constructor::with_config(problem, self.constructor.clone()))
            }
            SolverKind::SetBnb => Box::new(SetBnB::with_config(problem, self.set_bnb.clone())),
            SolverKind::GreedySets => {
                Box::new(GreedySets::with_config(problem, self.greedy_sets.clone()))
            }
        }
    }
}
