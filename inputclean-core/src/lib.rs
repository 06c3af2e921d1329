// inputclean-core/src/lib.rs
//! # InputClean Core Library
//!
//! `inputclean-core` cleans untrusted, nested user input before application
//! code sees it. Every string leaf of a record is routed by its field path to a
//! named sanitization class, run through that class's filter pipeline, and
//! finally checked for residual XSS payloads. A detected payload rejects the
//! whole record.
//!
//! The library is pure computation: no I/O happens while cleaning, and a
//! single engine can be shared across worker threads.
//!
//! ## Modules
//!
//! * `config`: Defines the `Policy`, its `SanitizationClass`es and runtime `PolicyOverride`s.
//! * `matcher`: Matches field paths against rule keys (wildcard, exact, glob, regex).
//! * `resolver`: Picks the class for a field path.
//! * `tokenizer`: Shields substrings such as `<user@example.com>` from tag stripping.
//! * `filters`: The per-value pipeline (tags, scripts, character filters, blacklist).
//! * `xss`: Normalises values and checks them against attack signatures.
//! * `record`: Flattens nested records into field paths and rebuilds them.
//! * `sanitizers`: Compiles and caches policies.
//! * `engine`: Defines the `SanitizationEngine` trait.
//! * `engines`: Contains `PolicyEngine`, the concrete engine.
//! * `headless`: One-shot helpers using the default policy.
//! * `loggable`: Masks field values in debug logs.
//! * `errors`: `UnsafeInputError` and the library-wide `InputCleanError`.
//!
//! ## Usage Example
//!
//! ```rust
//! use inputclean_core::{PolicyEngine, SanitizationEngine, InputCleanError};
//! use serde_json::json;
//!
//! fn main() -> Result<(), InputCleanError> {
//!     let engine = PolicyEngine::with_default_policy()?;
//!
//!     let record = json!({
//!         "Model": {
//!             "name": "input cleaner <strong>nohtml</strong>",
//!             "email": "valid@example.com",
//!         }
//!     });
//!     let cleaned = engine.clean_all(&record, None)?;
//!     assert_eq!(cleaned["Model"]["name"], "input cleaner nohtml");
//!
//!     let attack = json!({ "Model": { "url": "javascript:alert(1)" } });
//!     assert!(engine.clean_all(&attack, None).is_err());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Cleaning fails only with `UnsafeInputError`, which names the field and a
//! SHA-256 fingerprint of the rejected value, never the value itself. Policy
//! loading uses `anyhow::Result`; validation and compilation report
//! `InputCleanError` variants.
//!
//! ---
//! License: MIT OR APACHE 2.0

pub mod config;
pub mod engine;
pub mod engines;
pub mod errors;
pub mod filters;
pub mod headless;
pub mod loggable;
pub mod matcher;
pub mod record;
pub mod resolver;
pub mod sanitizers;
pub mod tokenizer;
pub mod xss;

/// Re-exports the policy types and functions.
pub use config::{
    merge_policy,
    CharacterFilter,
    ClassOverride,
    FieldRule,
    FilterOptions,
    Policy,
    PolicyOverride,
    SanitizationClass,
    TagPolicy,
    MAX_PATTERN_LENGTH,
};

/// Re-exports the error types.
pub use errors::{InputCleanError, UnsafeInputError};

/// Re-exports the engine trait and its implementation.
pub use engine::SanitizationEngine;
pub use engines::policy_engine::PolicyEngine;

/// Re-exports the stand-alone building blocks.
pub use filters::{strip_scripts, strip_tags};
pub use matcher::{field_match, PatternKey, PatternKind};
pub use record::{expand, flatten, FieldPath, PathSegment};
pub use resolver::resolve;
pub use tokenizer::TokenMap;
pub use xss::{is_dangerous, XssSignatureSet, DEFAULT_XSS_PATTERNS};

/// Re-exports types and functions for one-shot use.
pub use headless::{clean_record, clean_record_with, clean_string};

// Compiled forms, for callers that drive the pipeline themselves.
pub use sanitizers::compiler::{compile_policy, get_or_compile_policy, CompiledClass, CompiledPolicy, TagStripping};
