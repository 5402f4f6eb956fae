//! Property-based testing entry point for oxirel-opt
//!
//! Run with: cargo test --test property_based

mod property_tests;
