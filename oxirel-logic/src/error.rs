//! Error types for models, rules and rule files.

use thiserror::Error;

/// Errors that can occur while parsing rules or evaluating them on a model.
#[derive(Error, Debug)]
pub enum LogicError {
    /// Malformed rule-file line.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// A literal with other than two arguments.
    #[error("line {line}: relation '{relation}' takes 2 arguments, found {found}")]
    Arity {
        /// 1-based line number
        line: usize,
        /// Relation name
        relation: String,
        /// Number of arguments found
        found: usize,
    },

    /// A relation used by the logic has no graph in the model.
    #[error("relation '{0}' used by the rules has no graph in the model")]
    MissingRelation(String),

    /// Two models that must share universe and relations do not.
    #[error("model shape mismatch: {0}")]
    ShapeMismatch(String),

    /// IO error while reading a rule file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for logic operations.
pub type Result<T> = std::result::Result<T, LogicError>;
