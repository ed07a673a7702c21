//! Run setup: locating executables and discovering tests.
//!
//! Everything here happens before the first job is scheduled; any error is fatal to the run.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::Diagnostic;
use shadertest_core::{FormatParseError, Validator};
use thiserror::Error;

use crate::runner::config::{Validators, slash_path};
use crate::runner::job::TestFile;

/// Extensions of test inputs found when a directory is given.
pub const TEST_EXTENSIONS: &[&str] = &["wgsl", "spvasm", "spv"];

/// Name of the compiler looked up on `PATH` when `--compiler` is not given.
pub const DEFAULT_COMPILER: &str = if cfg!(windows) { "tint.exe" } else { "tint" };

/// Errors that prevent a run from starting.
#[derive(Debug, Error, Diagnostic)]
pub enum SetupError {
    #[error("compiler not found at '{}'", .0.display())]
    #[diagnostic(
        code(shadertest::compiler_missing),
        help("build the compiler first, or point --compiler at it")
    )]
    CompilerMissing(PathBuf),

    #[error("'{}' is not an executable file", .0.display())]
    #[diagnostic(code(shadertest::compiler_not_executable))]
    CompilerNotExecutable(PathBuf),

    #[error("no compiler given and '{}' is not on PATH", DEFAULT_COMPILER)]
    #[diagnostic(code(shadertest::compiler_missing), help("pass --compiler <PATH>"))]
    CompilerNotFound,

    #[error("{validator} not found at '{}'", path.display())]
    #[diagnostic(
        code(shadertest::validator_missing),
        help("omit the flag to search next to the compiler and on PATH")
    )]
    ValidatorMissing { validator: &'static str, path: PathBuf },

    #[error("{0}")]
    #[diagnostic(
        code(shadertest::bad_format),
        help("possible values are: all, wgsl, spvasm, msl, hlsl, hlsl-dxc, hlsl-fxc, glsl")
    )]
    Format(#[from] FormatParseError),

    #[error("test path '{}' does not exist", .0.display())]
    #[diagnostic(code(shadertest::path_missing))]
    PathMissing(PathBuf),

    #[error("failed to read '{}'", path.display())]
    #[diagnostic(code(shadertest::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no tests found")]
    #[diagnostic(code(shadertest::no_tests))]
    NoTests,
}

// ============================================================================
// Executables
// ============================================================================

fn is_executable(meta: &fs::Metadata) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.is_file() && meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        meta.is_file()
    }
}

/// Check that `path` names an executable compiler.
pub fn check_compiler(path: &Path) -> Result<PathBuf, SetupError> {
    let meta = fs::metadata(path).map_err(|_| SetupError::CompilerMissing(path.to_path_buf()))?;
    if !is_executable(&meta) {
        return Err(SetupError::CompilerNotExecutable(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

/// Look for the default compiler on `PATH`.
pub fn find_compiler() -> Result<PathBuf, SetupError> {
    find_executable(DEFAULT_COMPILER, None).ok_or(SetupError::CompilerNotFound)
}

/// Find an executable `name` in `dir` first, then on `PATH`.
pub fn find_executable(name: &str, dir: Option<&Path>) -> Option<PathBuf> {
    let search_path = env::var_os("PATH").unwrap_or_default();
    dir.map(Path::to_path_buf)
        .into_iter()
        .chain(env::split_paths(&search_path))
        .map(|dir| dir.join(name))
        .find(|candidate| fs::metadata(candidate).is_ok_and(|m| is_executable(&m)))
}

/// Resolve every validator.
///
/// Explicit paths must exist. Validators without one are searched next to the compiler, then on `PATH`; a validator
/// that cannot be found is left disabled.
pub fn resolve_validators(explicit: &Validators, compiler: &Path) -> Result<Validators, SetupError> {
    let mut resolved = Validators::default();
    for validator in Validator::ALL {
        let path = match explicit.get(validator) {
            Some(path) if path.is_file() => Some(path.to_path_buf()),
            Some(path) => {
                return Err(SetupError::ValidatorMissing {
                    validator: validator.executable_name(),
                    path: path.to_path_buf(),
                });
            }
            None => find_executable(validator.executable_name(), compiler.parent()),
        };
        tracing::debug!(validator = validator.executable_name(), path = ?path, "resolved validator");
        resolved.set(validator, path);
    }
    Ok(resolved)
}

// ============================================================================
// Test discovery
// ============================================================================

fn is_test_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.contains(".expected.") {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEST_EXTENSIONS.contains(&ext))
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), SetupError> {
    let io_err = |source| SetupError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if !hidden {
                walk(&path, files)?;
            }
        } else if is_test_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Key a test by its path relative to `root`, with `/` separators.
pub fn test_key(path: &Path, root: &Path) -> String {
    slash_path(path.strip_prefix(root).unwrap_or(path))
}

/// Collect the tests named by `paths`, sorted and deduplicated.
///
/// Relative paths are resolved against `root`. A directory contributes every test file below it; a file is taken as
/// is, whatever its extension.
pub fn discover_tests(paths: &[PathBuf], root: &Path) -> Result<Vec<Arc<TestFile>>, SetupError> {
    let mut found = Vec::new();
    for path in paths {
        let path = root.join(path);
        if path.is_dir() {
            walk(&path, &mut found)?;
        } else if path.is_file() {
            found.push(path);
        } else {
            return Err(SetupError::PathMissing(path));
        }
    }
    found.sort();
    found.dedup();
    if found.is_empty() {
        return Err(SetupError::NoTests);
    }

    Ok(found
        .into_iter()
        .map(|path| {
            let key = test_key(&path, root);
            Arc::new(TestFile { path, key })
        })
        .collect())
}
