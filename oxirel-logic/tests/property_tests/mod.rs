//! Property-based tests for oxirel-logic
//!
//! Covers rule-file round trips, violation enumeration against brute force
//! and component decomposition.

mod consistency_properties;
mod parser_properties;
