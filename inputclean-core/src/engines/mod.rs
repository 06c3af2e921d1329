// inputclean-core/src/engines/mod.rs
//! Concrete implementations of the `SanitizationEngine` trait.
//!
//! License: MIT OR APACHE 2.0

pub mod policy_engine;
