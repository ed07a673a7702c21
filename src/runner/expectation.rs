//! Expectation files: naming, loading, matching and write-back.
//!
//! An expectation file sits next to its test as `<test>.expected.[ir.]<tag>` and holds the compiler output the
//! test is compared against. A file starting with `SKIP` marks the test as known to fail; its content is a sentinel
//! and never compared.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use shadertest_core::OutputFormat;
use shadertest_core::text::{is_skip_sentinel, normalize_line_endings, skip_expectation};

/// Path of the expectation file for `file` rendered as `format`.
pub fn expectation_path(file: &Path, format: OutputFormat, use_ir: bool) -> PathBuf {
    let mut path = OsString::from(file.as_os_str());
    path.push(".expected.");
    if use_ir {
        path.push("ir.");
    }
    path.push(format.expectation_tag());
    PathBuf::from(path)
}

/// A loaded expectation file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectation {
    pub path: PathBuf,
    /// Content with normalized line endings; empty if the file does not exist
    pub content: String,
    pub exists: bool,
    /// The content starts with the `SKIP` sentinel
    pub skip: bool,
}

impl Expectation {
    /// Load the expectation at `path`. A missing or unreadable file yields an empty expectation.
    pub async fn load(path: PathBuf) -> Self {
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                Self {
                    skip: is_skip_sentinel(&content),
                    content: normalize_line_endings(&content),
                    exists: true,
                    path,
                }
            }
            Err(_) => Self {
                path,
                ..Self::default()
            },
        }
    }

    /// Whether `output` satisfies this expectation.
    ///
    /// An empty expectation accepts any output.
    pub fn matches(&self, output: &str) -> bool {
        self.content.is_empty() || self.content == output
    }

    /// Record a passing run.
    ///
    /// Writes `output` as the new expectation, unless `may_write` is false (the test lives in a directory without
    /// PASS expectations). In that case a pre-existing expectation is deleted instead, and nothing is created.
    pub async fn record_pass(&self, output: &str, may_write: bool) -> io::Result<()> {
        if may_write {
            tokio::fs::write(&self.path, output).await
        } else if self.exists {
            tokio::fs::remove_file(&self.path).await
        } else {
            Ok(())
        }
    }

    /// Record a failing or skipped run as `SKIP: FAILED` followed by `output`.
    pub async fn record_skip(&self, output: &str) -> io::Result<()> {
        tokio::fs::write(&self.path, skip_expectation(output)).await
    }
}
