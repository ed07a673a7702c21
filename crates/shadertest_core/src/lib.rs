//! Provide the pure vocabulary and comparison policy of the shader conformance runner.
//!
//! This crate is intentionally small and dependency-light. It holds the deterministic pieces that both the job
//! runner and its tests rely on:
//! - the registry of output formats the compiler can emit, and how each one maps onto expectation files, compiler
//!   flags and validators;
//! - text policy: line-ending normalization, root substitution, `<<HASH: ...>>` marker extraction, the `flags:`
//!   header and the `SKIP` sentinel;
//! - a line-oriented inline diff used to explain mismatches.
//!
//! ## Notes
//!
//! - This is a "semantic core" crate: **no IO**, no async, no global state.

pub mod diff;
pub mod formats;
pub mod text;

pub use diff::inline_diff;
pub use formats::{FormatParseError, OutputFormat, Validation, Validator, parse_format_list};
