//! Error types for consistency solving.

use oxirel_logic::LogicError;
use oxirel_math::MathError;
use thiserror::Error;

/// Error type for solvers and the solve process
#[derive(Error, Debug)]
pub enum SolveError {
    /// Malformed matrix operation or LP failure
    #[error("matrix error: {0}")]
    Math(#[from] MathError),
    /// Rule or model error
    #[error("logic error: {0}")]
    Logic(#[from] LogicError),
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
    /// No assignment satisfies the rules
    #[error("no consistent assignment exists")]
    Infeasible,
    /// A heuristic search gave up
    #[error("{solver} found no consistent assignment: {reason}")]
    NoSolution {
        /// Solver name
        solver: &'static str,
        /// Why the search stopped
        reason: String,
    },
    /// A growing solver did not converge
    #[error("{solver} did not converge within {limit} iterations")]
    IterationLimit {
        /// Solver name
        solver: &'static str,
        /// Configured cap
        limit: usize,
    },
    /// Search node cap reached before any solution was found
    #[error("node limit of {0} reached without a solution")]
    NodeLimit(usize),
    /// The solve stopped at a checkpoint because a pause was requested
    #[error("solve paused")]
    Paused,
    /// The solve stopped at a checkpoint because it was cancelled
    #[error("solve cancelled")]
    Cancelled,
    /// Pause requested while the process was not running
    #[error("cannot pause a process that is {0}")]
    CannotPause(String),
    /// Result requested before the process was started
    #[error("process has not been started")]
    NotStarted,
    /// The worker thread panicked
    #[error("solver worker thread panicked")]
    WorkerPanicked,
}

/// Result type for solving
pub type Result<T> = std::result::Result<T, SolveError>;
