//! Run configuration for the job runner.
//!
//! Built once during setup and shared read-only by every worker.

use std::path::{Path, PathBuf};
use std::time::Duration;

use shadertest_core::Validator;

/// Wall-clock limit for a single compiler invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Directories (relative to the test root) that never get PASS expectation files.
///
/// These hold large corpora whose generated code is uninteresting.
pub const DEFAULT_NO_PASS_DIRS: &[&str] = &["benchmark/", "unittest/", "vk-gl-cts/"];

/// Resolved paths of the external validators; `None` means validation for that format is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub dxc: Option<PathBuf>,
    pub fxc: Option<PathBuf>,
    pub metal: Option<PathBuf>,
}

impl Validators {
    pub fn get(&self, validator: Validator) -> Option<&Path> {
        match validator {
            Validator::Dxc => self.dxc.as_deref(),
            Validator::Fxc => self.fxc.as_deref(),
            Validator::Metal => self.metal.as_deref(),
        }
    }

    pub fn set(&mut self, validator: Validator, path: Option<PathBuf>) {
        match validator {
            Validator::Dxc => self.dxc = path,
            Validator::Fxc => self.fxc = path,
            Validator::Metal => self.metal = path,
        }
    }
}

/// Expectation write-back behavior.
///
/// Both modes may be active at once; with neither, expectation files are never touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordModes {
    /// Overwrite expectations of clean runs with the actual output.
    pub pass: bool,
    /// Overwrite expectations of failing or skipped runs with a `SKIP: FAILED` sentinel plus the actual output.
    pub skip: bool,
}

/// Configuration shared by every job of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Compiler executable under test
    pub compiler: PathBuf,
    /// Project root; substituted with a placeholder in compiler output
    pub root: PathBuf,
    /// External validators found for this run
    pub validators: Validators,
    /// Generate through the alternate IR code path (`--use-ir`, `.expected.ir.*`)
    pub use_ir: bool,
    pub record: RecordModes,
    pub timeout: Duration,
    /// Absolute, `/`-separated directory prefixes excluded from PASS expectation files
    pub no_pass_dirs: Vec<String>,
}

impl RunConfig {
    /// Create a config with default settings for the given compiler and project root.
    pub fn new(compiler: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            root: root.into(),
            validators: Validators::default(),
            use_ir: false,
            record: RecordModes::default(),
            timeout: DEFAULT_TIMEOUT,
            no_pass_dirs: Vec::new(),
        }
    }

    pub fn with_validators(mut self, validators: Validators) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_use_ir(mut self, use_ir: bool) -> Self {
        self.use_ir = use_ir;
        self
    }

    pub fn with_record(mut self, record: RecordModes) -> Self {
        self.record = record;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exclude a directory from PASS expectation files.
    pub fn with_no_pass_dir(mut self, dir: &Path) -> Self {
        let mut prefix = slash_path(dir);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.no_pass_dirs.push(prefix);
        self
    }

    /// Project root with `/` separators, as it appears in compiler output.
    pub fn root_slash(&self) -> String {
        slash_path(&self.root)
    }

    /// Whether a PASS expectation file may be written for `file`.
    pub fn can_record_pass(&self, file: &Path) -> bool {
        let file = slash_path(file);
        !self.no_pass_dirs.iter().any(|dir| file.starts_with(dir.as_str()))
    }
}

/// Render a path with `/` separators regardless of host.
pub fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
