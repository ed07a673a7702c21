#![forbid(unsafe_code)]
//! Shader compiler conformance test runner
//!
//! Runs a shader compiler over a corpus of test files, once per output format, and compares each output with the
//! expectation file stored next to the test. Outputs that an external validator accepted are remembered in a
//! validation cache so later runs can skip re-validating identical output.
//!
//! The pure text handling (format vocabulary, marker extraction, diffs) lives in `shadertest_core`; this crate owns
//! the process, filesystem and concurrency side.
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` and `runner` modules
//!   enforce `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.

pub mod cli;
pub mod runner;
pub mod version;

pub use runner::{ConsoleReporter, Reporter, RunConfig, RunSummary, ValidationCache, run_suite};
pub use shadertest_core::OutputFormat;
