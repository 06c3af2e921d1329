// inputclean-core/src/engine.rs
//! Defines the core SanitizationEngine trait.
//!
//! The trait is the seam between callers (request middleware, batch jobs,
//! the headless helpers) and the policy-driven implementation in
//! `engines::policy_engine`. Every method takes `&self`; implementations hold
//! their policy behind an atomic swap so one engine can be shared across
//! threads and reconfigured while in use.
//!
//! License: MIT OR APACHE 2.0

use serde_json::Value;

use crate::config::{Policy, PolicyOverride};
use crate::errors::{InputCleanError, UnsafeInputError};

/// A trait that defines the core functionality of a sanitization engine.
pub trait SanitizationEngine: Send + Sync {
    /// Cleans every string leaf of `record` and returns a record of the same shape.
    ///
    /// When `overrides` is given it is merged over the active policy for this
    /// call only. Stops at the first rejected field.
    ///
    /// # Arguments
    /// * `record` - The nested input record.
    /// * `overrides` - Optional per-call policy changes.
    fn clean_all(&self, record: &Value, overrides: Option<&PolicyOverride>) -> Result<Value, InputCleanError>;

    /// Cleans `value` as the field at `field_path`.
    ///
    /// Arrays and objects are cleaned element-wise; every child inherits
    /// `field_path`. Non-string leaves and unmatched paths pass through.
    fn clean_field(&self, value: &Value, field_path: &str) -> Result<Value, UnsafeInputError>;

    /// Cleans one string with a named class. An unknown class leaves it unchanged.
    fn clean(&self, value: &str, class_name: &str) -> Result<String, UnsafeInputError>;

    /// Returns a copy of the active policy.
    fn policy(&self) -> Policy;

    /// Merges `overrides` into the active policy and swaps it in.
    ///
    /// The active policy is untouched if the merged result does not validate.
    fn set_policy(&self, overrides: PolicyOverride) -> Result<(), InputCleanError>;
}
