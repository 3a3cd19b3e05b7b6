//! Selecting asset files out of an extracted tree and merging them into the
//! canonical directory.
//!
//! Files are matched on their extension and copied flat, by file name only.
//! A name already present in the canonical directory is overwritten, so the
//! most recent copy wins.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Accepted asset extensions, without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetExtensions {
    extensions: BTreeSet<String>,
    ignore_case: bool,
}

impl AssetExtensions {
    /// Build a set from extensions such as `"milk"` or `".prjm"`.
    ///
    /// Returns `None` when no non-empty extension is given.
    pub fn new<I, S>(extensions: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions: BTreeSet<String> = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .collect();
        (!extensions.is_empty()).then_some(Self {
            extensions,
            ignore_case: false,
        })
    }

    /// Match extensions regardless of ASCII case.
    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// The configured extension `path` matches, if any.
    pub fn matching(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        if self.ignore_case {
            self.extensions
                .iter()
                .find(|accepted| accepted.eq_ignore_ascii_case(ext))
                .map(String::as_str)
        } else {
            self.extensions.get(ext).map(String::as_str)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

impl Default for AssetExtensions {
    fn default() -> Self {
        Self {
            extensions: ["milk", "prjm"].into_iter().map(String::from).collect(),
            ignore_case: false,
        }
    }
}

/// A single entry that could not be collected.
#[derive(Debug, Error)]
pub enum CollectFailure {
    #[error("cannot walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("cannot copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The canonical directory itself could not be prepared.
#[derive(Debug, Error)]
#[error("cannot create canonical directory {}: {source}", path.display())]
pub struct CanonicalDirError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Outcome of one collection pass.
#[derive(Debug, Default)]
pub struct CollectReport {
    /// Copies per accepted extension; overwrites count like new files.
    pub counts: BTreeMap<String, usize>,
    /// File names written, in walk order.
    pub collected: Vec<String>,
    pub failures: Vec<CollectFailure>,
}

impl CollectReport {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

pub fn ensure_canonical_dir(path: &Path) -> Result<(), CanonicalDirError> {
    fs::create_dir_all(path).map_err(|source| CanonicalDirError {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy every accepted file under `tree` into `canonical_dir`.
///
/// Per-file failures are recorded in the report and the walk continues.
pub fn collect(
    tree: &Path,
    extensions: &AssetExtensions,
    canonical_dir: &Path,
) -> Result<CollectReport, CanonicalDirError> {
    ensure_canonical_dir(canonical_dir)?;

    let mut report = CollectReport::default();
    // Sorted walk keeps overwrite order stable for duplicate names within one archive.
    for entry in WalkDir::new(tree).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                let path = source.path().unwrap_or(tree).to_path_buf();
                warn!(path = %path.display(), error = %source, "skipping unreadable entry");
                report.failures.push(CollectFailure::Walk { path, source });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = extensions.matching(entry.path()) else {
            continue;
        };

        let file_name = entry.file_name();
        let target = canonical_dir.join(file_name);
        match fs::copy(entry.path(), &target) {
            Ok(_) => {
                debug!(from = %entry.path().display(), to = %target.display(), "collected asset");
                *report.counts.entry(ext.to_string()).or_default() += 1;
                report
                    .collected
                    .push(file_name.to_string_lossy().into_owned());
            }
            Err(source) => {
                warn!(file = %entry.path().display(), error = %source, "failed to collect asset");
                report.failures.push(CollectFailure::Copy {
                    from: entry.path().to_path_buf(),
                    to: target,
                    source,
                });
            }
        }
    }

    Ok(report)
}

/// Names of accepted assets currently in `canonical_dir`, sorted.
pub fn inventory(canonical_dir: &Path, extensions: &AssetExtensions) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(canonical_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && extensions.matching(&entry.path()).is_some() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
