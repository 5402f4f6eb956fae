//! OxiRel Logic - Relation Graphs, Models and Rules
//!
//! This crate provides the data model the consistency solvers work on:
//! - [`Graph`] variants for weighted ([`ProbabilityGraph`]) and hard
//!   ([`SpecificGraph`], [`EquivalenceGraph`], [`MembershipGraph`]) relations
//! - [`Model`]: a universe of `n` terms with one graph per relation, and the
//!   bijection between `(relation, i, j)` and [`EdgeId`]
//! - [`Rule`] and [`Logic`]: Horn-like clauses over binary relations, parsed
//!   from the rule-file format and interned in a per-logic [`RulePool`]
//! - grounding of rules into [`GroundClause`]s over edge literals
//!
//! # Examples
//!
//! ```
//! use oxirel_logic::{Logic, Model};
//!
//! let logic = Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap();
//!
//! let mut model = Model::new(3);
//! let hyp = model.add_probability_graph("hyp");
//! hyp.set_base_val(0.02);
//! hyp.set_val(0, 1, 0.9);
//! hyp.set_val(1, 2, 0.9);
//!
//! let violations = logic.violations(&model).unwrap();
//! assert_eq!(violations.len(), 1);
//! assert_eq!(violations[0].assignment.as_slice(), &[0, 1, 2]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod graph;
pub mod ground;
pub mod logic;
pub mod model;
pub mod parser;
pub mod pool;
pub mod rule;

pub use error::{LogicError, Result};
pub use graph::{
    EquivalenceGraph, Graph, GraphKind, MembershipGraph, ProbabilityGraph, SpecificGraph,
};
pub use ground::{ClauseLit, GroundClause, GroundScope};
pub use logic::{Logic, Violation};
pub use model::{Component, EdgeId, ElementId, Model, RelationId};
pub use pool::{RuleId, RulePool};
pub use rule::{Atom, Literal, Rule, Var};
