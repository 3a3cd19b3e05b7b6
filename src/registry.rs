//! The ordered list of preset archives a run processes.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Built-in preset packs: `(id, archive url, local archive name)`.
const BUILTIN_SOURCES: &[(&str, &str, &str)] = &[
    (
        "cream-of-the-crop",
        "https://github.com/projectM-visualizer/presets-cream-of-the-crop/archive/refs/heads/master.zip",
        "presets-cream-of-the-crop.zip",
    ),
    (
        "milkdrop-original",
        "https://github.com/projectM-visualizer/presets-milkdrop-original/archive/refs/heads/master.zip",
        "presets-milkdrop-original.zip",
    ),
    (
        "en-d",
        "https://github.com/projectM-visualizer/presets-en-d/archive/refs/heads/master.zip",
        "presets-en-d.zip",
    ),
    (
        "classic",
        "https://github.com/projectM-visualizer/presets-projectm-classic/archive/refs/heads/master.zip",
        "presets-projectm-classic.zip",
    ),
];

/// Where a source's archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Remote(String),
    /// An archive already on disk; the fetch stage is skipped.
    Local(PathBuf),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Remote(url) => f.write_str(url),
            Origin::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    id: String,
    origin: Origin,
    archive_name: String,
}

impl Source {
    pub fn remote(
        id: impl Into<String>,
        url: impl Into<String>,
        archive_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            origin: Origin::Remote(url.into()),
            archive_name: archive_name.into(),
        }
    }

    pub fn local(id: impl Into<String>, path: PathBuf) -> Self {
        let archive_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: id.into(),
            origin: Origin::Local(path),
            archive_name,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// File name the archive is stored under inside a scratch workspace.
    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidSource {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id is empty"));
        }
        match &self.origin {
            Origin::Remote(url) if url.trim().is_empty() => {
                return Err(invalid("url is empty"));
            }
            Origin::Remote(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                return Err(invalid("url must use http or https"));
            }
            _ => {}
        }
        if self.archive_name.is_empty()
            || self.archive_name.contains(['/', '\\'])
            || self.archive_name == "."
            || self.archive_name == ".."
        {
            return Err(invalid("archive name must be a plain file name"));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid source `{id}`: {reason}")]
    InvalidSource { id: String, reason: String },
    #[error("source id `{0}` is listed more than once")]
    DuplicateId(String),
    #[error("cannot scan local archives in {}: {source}", dir.display())]
    LocalScan {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered, validated sources. Order decides which copy wins on name collisions.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Source>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for source in &sources {
            source.validate()?;
            if !seen.insert(source.id.as_str()) {
                return Err(RegistryError::DuplicateId(source.id.clone()));
            }
        }
        Ok(Self { sources })
    }

    /// The preset packs compiled into the binary.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(
            BUILTIN_SOURCES
                .iter()
                .map(|(id, url, name)| Source::remote(*id, *url, *name))
                .collect(),
        )
    }

    /// Append every `*.zip` directly inside `dir`, sorted by name.
    ///
    /// Ids are `local:<file name>`, so archives differing only in the case of
    /// their extension stay distinct. A missing directory contributes nothing.
    pub fn with_local_archives(self, dir: &Path) -> Result<Self, RegistryError> {
        let scan_err = |source| RegistryError::LocalScan {
            dir: dir.to_path_buf(),
            source,
        };

        let mut archives = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(self),
            Err(e) => return Err(scan_err(e)),
        };
        for entry in entries {
            let entry = entry.map_err(scan_err)?;
            let path = entry.path();
            let is_zip = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
            if is_zip && entry.file_type().map_err(scan_err)?.is_file() {
                archives.push(path);
            }
        }
        archives.sort();

        let mut sources = self.sources;
        sources.extend(archives.into_iter().map(|path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Source::local(format!("local:{name}"), path)
        }));
        Self::new(sources)
    }

    /// Keep only sources that need no network.
    pub fn local_only(self) -> Self {
        Self {
            sources: self
                .sources
                .into_iter()
                .filter(|s| matches!(s.origin, Origin::Local(_)))
                .collect(),
        }
    }

    /// Whether any source has to be downloaded.
    pub fn needs_network(&self) -> bool {
        self.sources
            .iter()
            .any(|s| matches!(s.origin, Origin::Remote(_)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<'a> IntoIterator for &'a SourceRegistry {
    type Item = &'a Source;
    type IntoIter = std::slice::Iter<'a, Source>;

    fn into_iter(self) -> Self::IntoIter {
        self.sources.iter()
    }
}
