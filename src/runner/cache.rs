//! Persistent cache of validated output hashes.
//!
//! Running the external validators is the slowest part of a run. The compiler prints a hash of every output it
//! validated, and accepts a list of hashes (`--skip-hash`) whose output it may assume valid. This module remembers
//! those hashes per (test file, format) between runs.
//!
//! ## Invalidation
//!
//! The cache is stamped with a fingerprint of the validator executables. When the fingerprint changes, every entry
//! is discarded, since a new validator may reject output an old one accepted.
//!
//! ## File format
//!
//! ```json
//! {
//!   "ToolchainHash": "<hex sha256>",
//!   "KnownGood": [
//!     { "File": "test/a.wgsl", "Format": "msl", "Hashes": ["0x12"] }
//!   ]
//! }
//! ```
//!
//! Entries are sorted by file then format so the file diffs cleanly.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shadertest_core::{OutputFormat, Validator};
use thiserror::Error;

use super::config::Validators;

/// Key of a cache entry: project-root relative test path (with `/` separators) and format.
pub type CacheKey = (String, OutputFormat);

/// Validated output hashes per (file, format).
pub type KnownGood = HashMap<CacheKey, Vec<String>>;

/// Hashes recorded in `known_good` for `(file, format)`; empty if none.
pub fn known_hashes<'a>(known_good: &'a KnownGood, file: &str, format: OutputFormat) -> &'a [String] {
    known_good
        .get(&(file.to_string(), format))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Errors writing the cache file.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialize the validation cache: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to save the validation cache file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CacheFile {
    toolchain_hash: String,
    known_good: Vec<CacheFileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CacheFileEntry {
    file: String,
    format: String,
    hashes: Vec<String>,
}

/// The validation cache of one run.
///
/// The lookup table sits behind an [`Arc`] so workers can read it without locking while the run is in flight.
/// It is only replaced (never mutated in place) by [`ValidationCache::merge`], once every result is in.
#[derive(Debug, Clone)]
pub struct ValidationCache {
    path: PathBuf,
    toolchain_hash: String,
    known_good: Arc<KnownGood>,
    toolchain_changed: bool,
}

impl ValidationCache {
    /// Create an empty cache stamped with `toolchain_hash`.
    pub fn empty(path: impl Into<PathBuf>, toolchain_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            toolchain_hash: toolchain_hash.into(),
            known_good: Arc::new(KnownGood::new()),
            toolchain_changed: false,
        }
    }

    /// Load the cache at `path`.
    ///
    /// Returns an empty cache if the file is missing or unreadable, or was written for another toolchain. None of
    /// these fail the run.
    pub fn load(path: impl Into<PathBuf>, toolchain_hash: &str) -> Self {
        let mut cache = Self::empty(path, toolchain_hash);

        let content = match fs::read_to_string(&cache.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %cache.path.display(), error = %e, "no validation cache loaded");
                return cache;
            }
        };

        let file: CacheFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %cache.path.display(), error = %e, "ignoring unreadable validation cache");
                return cache;
            }
        };

        if file.toolchain_hash != toolchain_hash {
            tracing::warn!("toolchains have changed, clearing validation cache");
            cache.toolchain_changed = true;
            return cache;
        }

        let mut known_good = KnownGood::with_capacity(file.known_good.len());
        for entry in file.known_good {
            match OutputFormat::from_name(&entry.format) {
                Some(format) => {
                    known_good.insert((entry.file, format), entry.hashes);
                }
                None => tracing::debug!(format = %entry.format, "dropping cache entry with unknown format"),
            }
        }
        cache.known_good = Arc::new(known_good);
        cache
    }

    /// Whether [`ValidationCache::load`] discarded a cache written for another toolchain.
    pub fn toolchain_changed(&self) -> bool {
        self.toolchain_changed
    }

    pub fn toolchain_hash(&self) -> &str {
        &self.toolchain_hash
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hashes previously validated for `(file, format)`; empty if none.
    pub fn lookup(&self, file: &str, format: OutputFormat) -> &[String] {
        known_hashes(&self.known_good, file, format)
    }

    /// Shared read-only view of the table, handed to workers.
    pub fn snapshot(&self) -> Arc<KnownGood> {
        Arc::clone(&self.known_good)
    }

    pub fn len(&self) -> usize {
        self.known_good.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_good.is_empty()
    }

    /// Replace the table with the hashes observed in this run.
    ///
    /// Pairs that were not run, or that produced no validated hash, are dropped.
    pub fn merge(&mut self, observed: KnownGood) {
        let known_good: KnownGood = observed.into_iter().filter(|(_, hashes)| !hashes.is_empty()).collect();
        self.known_good = Arc::new(known_good);
    }

    /// Serialize the cache, entries sorted by file then format name.
    pub fn to_json(&self) -> Result<String, CacheError> {
        let mut entries: Vec<CacheFileEntry> = self
            .known_good
            .iter()
            .map(|((file, format), hashes)| CacheFileEntry {
                file: file.clone(),
                format: format.name().to_string(),
                hashes: hashes.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.file.cmp(&b.file).then_with(|| a.format.cmp(&b.format)));

        let file = CacheFile {
            toolchain_hash: self.toolchain_hash.clone(),
            known_good: entries,
        };
        let mut json = serde_json::to_string_pretty(&file)?;
        json.push('\n');
        Ok(json)
    }

    /// Write the cache to its path.
    ///
    /// The content goes to a sibling temporary file first and is renamed over the target, so an interrupted save
    /// never leaves a truncated cache behind.
    pub fn save(&self) -> Result<(), CacheError> {
        let json = self.to_json()?;
        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        tracing::debug!(path = %self.path.display(), entries = self.len(), "saved validation cache");
        Ok(())
    }
}

/// Fingerprint the external validators.
///
/// Hashes each validator's executable name and, when it was found, its modification time and size. Any change to
/// an installed validator therefore changes the fingerprint.
pub fn toolchain_fingerprint(validators: &Validators) -> String {
    let mut hasher = Sha256::new();
    for validator in Validator::ALL {
        hasher.update(validator.executable_name().as_bytes());
        let Some(meta) = validators.get(validator).and_then(|p| fs::metadata(p).ok()) else {
            continue;
        };
        if let Some(modified) = meta.modified().ok().and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
            hasher.update(modified.as_nanos().to_string().as_bytes());
        }
        hasher.update(meta.len().to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn observed(entries: &[(&str, OutputFormat, &[&str])]) -> KnownGood {
        entries
            .iter()
            .map(|(file, format, hashes)| {
                (
                    (file.to_string(), *format),
                    hashes.iter().map(|h| h.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ValidationCache::load(dir.path().join("validation.cache"), "abc");
        assert!(cache.is_empty());
        assert!(!cache.toolchain_changed());
        assert_eq!(cache.toolchain_hash(), "abc");
    }

    #[test]
    fn test_garbage_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validation.cache");
        fs::write(&path, "not json").unwrap();
        let cache = ValidationCache::load(&path, "abc");
        assert!(cache.is_empty());
        assert!(!cache.toolchain_changed());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validation.cache");

        let mut cache = ValidationCache::empty(&path, "abc");
        cache.merge(observed(&[
            ("test/b.wgsl", OutputFormat::Msl, &["0x2"]),
            ("test/a.wgsl", OutputFormat::Spvasm, &["0x1", "0x3"]),
        ]));
        cache.save().unwrap();

        let loaded = ValidationCache::load(&path, "abc");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.lookup("test/a.wgsl", OutputFormat::Spvasm), ["0x1", "0x3"]);
        assert_eq!(loaded.lookup("test/b.wgsl", OutputFormat::Msl), ["0x2"]);
        assert!(loaded.lookup("test/b.wgsl", OutputFormat::Glsl).is_empty());
    }

    #[test]
    fn test_toolchain_change_discards_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validation.cache");

        let mut cache = ValidationCache::empty(&path, "f1");
        cache.merge(observed(&[("test/a.wgsl", OutputFormat::Msl, &["0x1"])]));
        cache.save().unwrap();

        let loaded = ValidationCache::load(&path, "f2");
        assert!(loaded.is_empty());
        assert!(loaded.toolchain_changed());
        assert_eq!(loaded.toolchain_hash(), "f2");
    }

    #[test]
    fn test_merge_prunes_unseen_and_empty() {
        let mut cache = ValidationCache::empty("unused", "abc");
        cache.merge(observed(&[
            ("test/a.wgsl", OutputFormat::Msl, &["0x1"]),
            ("test/b.wgsl", OutputFormat::Msl, &["0x2"]),
        ]));
        cache.merge(observed(&[
            ("test/a.wgsl", OutputFormat::Msl, &["0x9"]),
            ("test/c.wgsl", OutputFormat::Msl, &[]),
        ]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("test/a.wgsl", OutputFormat::Msl), ["0x9"]);
    }

    #[test]
    fn test_known_hashes_matches_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ValidationCache::empty(dir.path().join("c"), "t");
        cache.merge(observed(&[("a.wgsl", OutputFormat::Msl, &["0x1", "0x2"])]));

        let snapshot = cache.snapshot();
        assert_eq!(known_hashes(&snapshot, "a.wgsl", OutputFormat::Msl), ["0x1", "0x2"]);
        assert_eq!(known_hashes(&snapshot, "a.wgsl", OutputFormat::Msl), cache.lookup("a.wgsl", OutputFormat::Msl));
        assert!(known_hashes(&snapshot, "a.wgsl", OutputFormat::HlslDxc).is_empty());
        assert!(known_hashes(&snapshot, "b.wgsl", OutputFormat::Msl).is_empty());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_merge() {
        let mut cache = ValidationCache::empty("unused", "abc");
        cache.merge(observed(&[("test/a.wgsl", OutputFormat::Msl, &["0x1"])]));
        let snapshot = cache.snapshot();
        cache.merge(KnownGood::new());
        assert!(cache.is_empty());
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_json_is_sorted() {
        let mut cache = ValidationCache::empty("unused", "abc");
        cache.merge(observed(&[
            ("test/b.wgsl", OutputFormat::Glsl, &["0x4"]),
            ("test/a.wgsl", OutputFormat::Spvasm, &["0x2"]),
            ("test/a.wgsl", OutputFormat::Msl, &["0x1"]),
        ]));
        insta::assert_snapshot!(cache.to_json().unwrap().trim_end(), @r#"
        {
          "ToolchainHash": "abc",
          "KnownGood": [
            {
              "File": "test/a.wgsl",
              "Format": "msl",
              "Hashes": [
                "0x1"
              ]
            },
            {
              "File": "test/a.wgsl",
              "Format": "spvasm",
              "Hashes": [
                "0x2"
              ]
            },
            {
              "File": "test/b.wgsl",
              "Format": "glsl",
              "Hashes": [
                "0x4"
              ]
            }
          ]
        }
        "#);
    }

    #[test]
    fn test_fingerprint_tracks_validators() {
        let dir = tempfile::tempdir().unwrap();
        let dxc = dir.path().join("dxc");
        fs::write(&dxc, "v1").unwrap();

        let none = toolchain_fingerprint(&Validators::default());
        let with_dxc = toolchain_fingerprint(&Validators {
            dxc: Some(dxc.clone()),
            ..Validators::default()
        });
        assert_ne!(none, with_dxc);
        assert_eq!(none, toolchain_fingerprint(&Validators::default()));
        assert_eq!(none.len(), 64);

        fs::write(&dxc, "version two").unwrap();
        let changed = toolchain_fingerprint(&Validators {
            dxc: Some(dxc),
            ..Validators::default()
        });
        assert_ne!(with_dxc, changed);
    }
}
