//! Policy compilation for InputClean.
//!
//! This module turns a validated `Policy` into the regexes and ordered rule
//! keys used while cleaning, and caches the result so engines sharing a policy
//! also share its compiled form.
//!
//! This module works closely with `config` (for policy definitions), `matcher`
//! (for rule keys) and `xss` (for the signature set).

pub mod compiler;
