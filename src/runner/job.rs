//! Execution of a single work unit: one test file rendered in one output format.
//!
//! ## Classification
//!
//! First match wins:
//!
//! 1. clean exit and output matched the expectation -> `PASS`
//! 2. the expectation is marked `SKIP` -> `SKIP`
//! 3. non-zero exit (or timeout) -> `FAIL` with the compiler output
//! 4. otherwise -> `FAIL` with expected output, actual output and a diff
//!
//! Record modes layer on top: record-pass rewrites the expectation of a clean run (and forces a match),
//! record-skip rewrites the expectation of every `SKIP` or `FAIL`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use shadertest_core::text::{extract_hashes, normalize_line_endings, substitute_root};
use shadertest_core::{OutputFormat, Validation, inline_diff};
use thiserror::Error;

use super::cache::{KnownGood, known_hashes};
use super::config::RunConfig;
use super::expectation::{Expectation, expectation_path};
use super::interfaces::{Invocation, Invoker};

/// Classification of a work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Pass,
    Fail,
    Skip,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Pass => "PASS",
            StatusCode::Fail => "FAIL",
            StatusCode::Skip => "SKIP",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a work unit failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("test timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Non-zero exit; carries the compiler's combined output.
    #[error("{0}")]
    Exit(String),

    #[error(
        "Output was not as expected\n\n{rule}\n-- Expected:{pad}--\n{rule}\n{expected}\n\n{rule}\n-- Got:{pad_got}--\n{rule}\n{actual}\n\n{rule}\n-- Diff:{pad_diff}--\n{rule}\n{diff}",
        rule = RULE,
        pad = " ".repeat(RULE.len() - 14),
        pad_got = " ".repeat(RULE.len() - 9),
        pad_diff = " ".repeat(RULE.len() - 10)
    )]
    Mismatch {
        expected: String,
        actual: String,
        diff: String,
    },

    /// The worker went away without publishing a result.
    #[error("no result was produced for this test")]
    Lost,
}

const RULE: &str = "--------------------------------------------------------------------------------";

/// Result of one work unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub code: StatusCode,
    pub error: Option<JobError>,
    pub duration: Duration,
    /// Hashes of outputs the compiler validated during this run
    pub hashes: Vec<String>,
}

impl JobResult {
    fn pass(duration: Duration, hashes: Vec<String>) -> Self {
        Self {
            code: StatusCode::Pass,
            error: None,
            duration,
            hashes,
        }
    }

    fn skip(duration: Duration) -> Self {
        Self {
            code: StatusCode::Skip,
            error: None,
            duration,
            hashes: Vec::new(),
        }
    }

    fn fail(duration: Duration, error: JobError) -> Self {
        Self {
            code: StatusCode::Fail,
            error: Some(error),
            duration,
            hashes: Vec::new(),
        }
    }

    /// Result for a unit whose worker disappeared.
    pub fn lost() -> Self {
        Self::fail(Duration::ZERO, JobError::Lost)
    }
}

/// A discovered test input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFile {
    /// Absolute path
    pub path: PathBuf,
    /// Project-root relative path with `/` separators; display name and cache key
    pub key: String,
}

/// One (file, format) pair to execute.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub file: Arc<TestFile>,
    pub format: OutputFormat,
    /// Extra compiler flags from the test's `flags:` header
    pub flags: Arc<Vec<String>>,
}

/// Read-only state shared by every job of a run.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub config: Arc<RunConfig>,
    pub known_good: Arc<KnownGood>,
}

impl JobContext {
    /// Compiler arguments for `unit`, and whether validation was requested.
    pub fn compiler_args(&self, unit: &WorkUnit) -> (Vec<String>, bool) {
        let config = &self.config;
        let mut args = vec![
            unit.file.path.to_string_lossy().into_owned(),
            "--format".to_string(),
            unit.format.compiler_format().to_string(),
            "--print-hash".to_string(),
        ];

        if config.use_ir {
            args.push("--use-ir".to_string());
        }

        if unit.format.caches_validation() {
            let hashes = known_hashes(&self.known_good, &unit.file.key, unit.format);
            if !hashes.is_empty() {
                args.push("--skip-hash".to_string());
                args.push(hashes.join(","));
            }
        }

        let validate = match unit.format.validation() {
            Validation::Builtin => {
                args.push("--validate".to_string());
                true
            }
            Validation::External(validator) => match config.validators.get(validator) {
                Some(path) => {
                    args.push(validator.compiler_flag().to_string());
                    args.push(path.to_string_lossy().into_owned());
                    true
                }
                None => false,
            },
        };

        args.extend(unit.flags.iter().cloned());
        (args, validate)
    }
}

/// Run one work unit to completion.
#[tracing::instrument(skip_all, fields(file = %unit.file.key, format = %unit.format))]
pub async fn run_job<I: Invoker>(unit: &WorkUnit, ctx: &JobContext, invoker: &I) -> JobResult {
    let config = &ctx.config;
    let expectation =
        Expectation::load(expectation_path(&unit.file.path, unit.format, config.use_ir)).await;

    let (args, validate) = ctx.compiler_args(unit);
    tracing::debug!(?args, validate, "invoking compiler");

    let start = Instant::now();
    let invocation = invoker.invoke(&config.compiler, &args, config.timeout).await;
    let duration = start.elapsed();

    let (ok, raw, timed_out) = match invocation {
        Invocation::Exited { success, output } => (success, output, None),
        Invocation::TimedOut(limit) => (false, JobError::Timeout(limit).to_string(), Some(limit)),
    };

    let out = substitute_root(&normalize_line_endings(&raw), &config.root_slash());
    let (out, hashes) = extract_hashes(&out);
    let mut matched = expectation.matches(&out);

    if ok && config.record.pass && (validate || !expectation.skip) {
        let may_write = config.can_record_pass(&unit.file.path);
        if let Err(e) = expectation.record_pass(&out, may_write).await {
            tracing::warn!(path = %expectation.path.display(), error = %e, "failed to update expectation file");
        }
        matched = true;
    }

    if ok && matched {
        return JobResult::pass(duration, hashes);
    }

    if config.record.skip {
        if let Err(e) = expectation.record_skip(&out).await {
            tracing::warn!(path = %expectation.path.display(), error = %e, "failed to record skip expectation");
        }
    }

    if expectation.skip {
        return JobResult::skip(duration);
    }

    if !ok {
        let error = match timed_out {
            Some(limit) => JobError::Timeout(limit),
            None => JobError::Exit(out),
        };
        return JobResult::fail(duration, error);
    }

    let diff = inline_diff(&expectation.content, &out);
    JobResult::fail(
        duration,
        JobError::Mismatch {
            expected: expectation.content,
            actual: out,
            diff,
        },
    )
}
