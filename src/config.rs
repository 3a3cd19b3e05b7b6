//! Run settings consumed by the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use crate::collect::AssetExtensions;
use crate::fetch::{Backend, RetryPolicy, ToolLocator};

/// Where projectM looks for user presets, relative to the home directory.
pub const PRESETS_SUBDIR: &str = ".projectM/presets";
/// Directory scanned for already-downloaded preset archives.
pub const LOCAL_ARCHIVE_SUBDIR: &str = ".projectM";

#[derive(Debug, Clone)]
pub struct Settings {
    pub canonical_dir: PathBuf,
    /// Parent of the per-source scratch workspaces.
    pub scratch_root: PathBuf,
    pub backend: Backend,
    pub tool_locator: ToolLocator,
    /// Bypass `HTTP_PROXY`-style settings for every backend.
    pub direct_connection: bool,
    pub retry: RetryPolicy,
    pub extract_timeout: Duration,
    pub extensions: AssetExtensions,
    /// Leave consumed local archives where they are instead of moving them
    /// to `processed/`.
    pub keep_local_archives: bool,
    /// Collected file names listed in the summary.
    pub sample_size: usize,
}

impl Settings {
    /// Defaults for everything but the output location.
    pub fn new(canonical_dir: impl Into<PathBuf>) -> Self {
        Self {
            canonical_dir: canonical_dir.into(),
            scratch_root: std::env::temp_dir(),
            backend: Backend::Native,
            tool_locator: ToolLocator::default(),
            direct_connection: false,
            retry: RetryPolicy::default(),
            extract_timeout: Duration::from_secs(300),
            extensions: AssetExtensions::default(),
            keep_local_archives: false,
            sample_size: 10,
        }
    }
}

pub fn default_canonical_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(PRESETS_SUBDIR))
}

pub fn default_local_archive_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOCAL_ARCHIVE_SUBDIR))
}

