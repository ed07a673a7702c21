//! Conformance run engine.
//!
//! A run crosses every discovered test file with every requested output format. Each pair is a work unit executed
//! by the worker pool ([`pool`]) through the job runner ([`job`]); the aggregator ([`report`]) consumes results in
//! canonical order and the validation cache ([`cache`]) is updated once at the end.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod cache;
pub mod config;
pub mod expectation;
pub mod interfaces;
pub mod job;
pub mod pool;
pub mod report;

use std::sync::Arc;

use shadertest_core::OutputFormat;
use thiserror::Error;

pub use cache::{CacheError, KnownGood, ValidationCache, toolchain_fingerprint};
pub use config::{RecordModes, RunConfig, Validators};
pub use interfaces::{Invocation, Invoker, ProcessInvoker};
pub use job::{JobError, JobResult, StatusCode, TestFile};
pub use report::{ConsoleReporter, Reporter, RunSummary};

/// Errors that end a run after the results are in.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to save validation cache: {0}")]
    Cache(#[from] CacheError),
}

/// Saves the cache when dropped, unless the run already saved it.
///
/// Keeps the cache on disk current if the run future is dropped part way through aggregation.
struct SaveGuard<'a> {
    cache: &'a mut ValidationCache,
    armed: bool,
}

impl<'a> SaveGuard<'a> {
    fn new(cache: &'a mut ValidationCache) -> Self {
        Self { cache, armed: true }
    }

    fn finish(mut self, observed: KnownGood) -> Result<(), CacheError> {
        self.armed = false;
        self.cache.merge(observed);
        self.cache.save()
    }
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.cache.save() {
            tracing::warn!(error = %e, "failed to save validation cache");
        }
    }
}

/// Run every (file, format) pair and report the results.
///
/// Workers see a read-only snapshot of the cache; the hashes observed during the run replace the cache content
/// once every result has been consumed, and the cache is saved.
pub async fn run_suite<I, R>(
    files: &[Arc<TestFile>],
    formats: &[OutputFormat],
    config: Arc<RunConfig>,
    cache: &mut ValidationCache,
    invoker: Arc<I>,
    workers: usize,
    reporter: &mut R,
) -> Result<RunSummary, RunnerError>
where
    I: Invoker,
    R: Reporter + ?Sized,
{
    let guard = SaveGuard::new(cache);
    let ctx = job::JobContext {
        config,
        known_good: guard.cache.snapshot(),
    };

    tracing::debug!(files = files.len(), formats = formats.len(), workers, "running suite");
    let grid = pool::spawn(files, formats, ctx, invoker, workers);
    let collected = report::collect(files, formats, grid, reporter).await;

    guard.finish(collected.observed)?;
    Ok(collected.summary)
}
