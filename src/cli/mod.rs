//! CLI module for the shader compiler test runner
//!
//! ## Usage
//!
//! `shadertest [flags...] [paths...]` runs every test file found under `paths` (default `test/tint`) through the
//! compiler once per requested output format and compares the output against the expectation files next to each
//! test.
//!
//! ## Modules
//!
//! - `setup` - Compiler and validator lookup, test discovery
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod setup;

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use shadertest_core::{Validator, parse_format_list};

use crate::runner::config::DEFAULT_NO_PASS_DIRS;
use crate::runner::{
    ConsoleReporter, ProcessInvoker, RecordModes, Reporter, RunConfig, ValidationCache, Validators,
    toolchain_fingerprint,
};
use crate::version::SHADERTEST_VERSION;
use setup::SetupError;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<SetupError> for CliError {
    fn from(err: SetupError) -> Self {
        CliError::failure(format!("{:?}", miette::Report::new(err)))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Default location of the validation cache, relative to the project root.
pub const DEFAULT_CACHE_PATH: &str = "test/tint/validation.cache";

/// Directory holding the test corpus, relative to the project root.
pub const DEFAULT_TEST_DIR: &str = "test/tint";

/// Runs shader compiler end-to-end tests against expectation files
#[derive(Parser, Debug)]
#[command(name = "shadertest")]
#[command(version = SHADERTEST_VERSION)]
#[command(about = "Runs shader compiler end-to-end tests against expectation files", long_about = None)]
pub struct Cli {
    /// Test files or directories, relative to the project root
    #[arg(value_name = "PATH", default_value = DEFAULT_TEST_DIR)]
    pub paths: Vec<PathBuf>,

    /// Comma separated list of formats: all, wgsl, spvasm, msl, hlsl, hlsl-dxc, hlsl-fxc, glsl
    #[arg(long, value_name = "LIST", default_value = "all")]
    pub format: String,

    /// Compiler executable to test (default: search PATH)
    #[arg(long, value_name = "PATH")]
    pub compiler: Option<PathBuf>,

    /// DXC executable used to validate HLSL output
    #[arg(long, value_name = "PATH")]
    pub dxc: Option<PathBuf>,

    /// d3dcompiler library used to validate HLSL output with FXC
    #[arg(long, value_name = "PATH")]
    pub fxc: Option<PathBuf>,

    /// xcrun executable used to validate MSL output
    #[arg(long, value_name = "PATH")]
    pub xcrun: Option<PathBuf>,

    /// Project root (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Validation cache file (default: <root>/test/tint/validation.cache)
    #[arg(long, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Generate through the IR code path and use the `.expected.ir.*` files
    #[arg(long = "use-ir")]
    pub use_ir: bool,

    /// Overwrite expectation files of passing tests with the actual output
    #[arg(long = "generate-expected")]
    pub generate_expected: bool,

    /// Mark failing and skipped tests as SKIP in their expectation files
    #[arg(long = "generate-skip")]
    pub generate_skip: bool,

    /// Number of concurrent compiler invocations (default: available parallelism)
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Seconds before a compiler invocation is killed
    #[arg(long, value_name = "SECS", default_value_t = 120)]
    pub timeout: u64,

    /// Print every row, not only rows with a non-PASS result
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory, relative to the project root, whose tests never get PASS expectation files (repeatable)
    #[arg(long = "no-pass-dir", value_name = "DIR")]
    pub no_pass_dirs: Vec<PathBuf>,
}

impl Cli {
    fn explicit_validators(&self) -> Validators {
        Validators {
            dxc: self.dxc.clone(),
            fxc: self.fxc.clone(),
            metal: self.xcrun.clone(),
        }
    }

    /// Directories excluded from PASS expectation files, made absolute against `root`.
    fn no_pass_dirs(&self, root: &Path) -> Vec<PathBuf> {
        if self.no_pass_dirs.is_empty() {
            DEFAULT_NO_PASS_DIRS
                .iter()
                .map(|dir| root.join(DEFAULT_TEST_DIR).join(dir))
                .collect()
        } else {
            self.no_pass_dirs.iter().map(|dir| root.join(dir)).collect()
        }
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the run on a fresh multi-threaded runtime.
pub fn execute(cli: Cli) -> CliResult<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failure(format!("failed to start async runtime: {e}")))?;
    runtime.block_on(run_tests(cli))
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

async fn run_tests(cli: Cli) -> CliResult<ExitCode> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => env::current_dir().map_err(|e| CliError::failure(format!("failed to get current directory: {e}")))?,
    };
    let root = root
        .canonicalize()
        .map_err(|e| CliError::failure(format!("invalid root '{}': {e}", root.display())))?;

    let formats = parse_format_list(&cli.format).map_err(SetupError::from)?;
    let compiler = match &cli.compiler {
        Some(path) => setup::check_compiler(path)?,
        None => setup::find_compiler()?,
    };
    let validators = setup::resolve_validators(&cli.explicit_validators(), &compiler)?;
    let files = setup::discover_tests(&cli.paths, &root)?;

    let mut reporter = ConsoleReporter::new(cli.verbose);
    report_validators(&mut reporter, &validators);

    let cache_path = cli.cache.clone().unwrap_or_else(|| root.join(DEFAULT_CACHE_PATH));
    let mut cache = ValidationCache::load(cache_path, &toolchain_fingerprint(&validators));
    if cache.toolchain_changed() {
        reporter.on_toolchain_changed();
    }

    let mut config = RunConfig::new(compiler, &root)
        .with_validators(validators)
        .with_use_ir(cli.use_ir)
        .with_record(RecordModes {
            pass: cli.generate_expected,
            skip: cli.generate_skip,
        })
        .with_timeout(Duration::from_secs(cli.timeout));
    for dir in cli.no_pass_dirs(&root) {
        config = config.with_no_pass_dir(&dir);
    }

    let workers = cli.jobs.unwrap_or_else(default_jobs);
    let summary = crate::runner::run_suite(
        &files,
        &formats,
        Arc::new(config),
        &mut cache,
        Arc::new(ProcessInvoker),
        workers,
        &mut reporter,
    )
    .await
    .map_err(|e| CliError::failure(e.to_string()))?;

    Ok(if summary.any_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Report the validation status of every external validator, whichever formats were requested.
fn report_validators(reporter: &mut dyn Reporter, validators: &Validators) {
    for validator in Validator::ALL {
        reporter.on_validator(validator.format(), validators.get(validator));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::try_parse_from(["shadertest"]).unwrap();
        assert_eq!(cli.paths, [PathBuf::from("test/tint")]);
        assert_eq!(cli.format, "all");
        assert_eq!(cli.timeout, 120);
        assert!(cli.jobs.is_none());
        assert!(!cli.generate_expected);
        assert!(!cli.generate_skip);
    }

    #[test]
    fn test_cli_parse_flags() {
        let cli = Cli::try_parse_from([
            "shadertest",
            "--format",
            "wgsl,msl",
            "--compiler",
            "out/tint",
            "-j",
            "4",
            "--generate-skip",
            "--use-ir",
            "-v",
            "test/tint/a.wgsl",
            "test/tint/b",
        ])
        .unwrap();
        assert_eq!(cli.format, "wgsl,msl");
        assert_eq!(cli.compiler, Some(PathBuf::from("out/tint")));
        assert_eq!(cli.jobs, Some(4));
        assert!(cli.generate_skip);
        assert!(cli.use_ir);
        assert!(cli.verbose);
        assert_eq!(cli.paths.len(), 2);
    }

    #[test]
    fn test_cli_validators() {
        let cli = Cli::try_parse_from(["shadertest", "--dxc", "/bin/dxc", "--xcrun", "/usr/bin/xcrun"]).unwrap();
        let validators = cli.explicit_validators();
        assert_eq!(validators.dxc, Some(PathBuf::from("/bin/dxc")));
        assert_eq!(validators.fxc, None);
        assert_eq!(validators.metal, Some(PathBuf::from("/usr/bin/xcrun")));
    }

    #[test]
    fn test_cli_no_pass_dirs() {
        let root = Path::new("/src/dawn");
        let cli = Cli::try_parse_from(["shadertest"]).unwrap();
        let dirs = cli.no_pass_dirs(root);
        assert_eq!(dirs.len(), DEFAULT_NO_PASS_DIRS.len());
        assert_eq!(dirs[0], root.join("test/tint/benchmark/"));

        let cli = Cli::try_parse_from(["shadertest", "--no-pass-dir", "test/big", "--no-pass-dir", "test/huge"]).unwrap();
        assert_eq!(cli.no_pass_dirs(root), [root.join("test/big"), root.join("test/huge")]);
    }

    #[test]
    fn test_report_validators_lists_all() {
        let validators = Validators {
            dxc: Some(PathBuf::from("/bin/dxc")),
            ..Validators::default()
        };
        let mut reporter = ConsoleReporter::with_writer(Vec::new(), false, false);
        report_validators(&mut reporter, &validators);

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.contains(" validation ")));
        assert!(lines[0].starts_with("hlsl-dxc") && lines[0].ends_with("ENABLED (/bin/dxc)"));
        assert!(lines[1].starts_with("hlsl-fxc") && lines[1].ends_with("DISABLED"));
        assert!(lines[2].starts_with("msl") && lines[2].ends_with("DISABLED"));
    }

    #[test]
    fn test_setup_error_keeps_message() {
        let err = CliError::from(SetupError::NoTests);
        assert_eq!(err.exit_code, ExitCode::FAILURE);
        assert!(err.message.contains("no tests found"));
    }
}
