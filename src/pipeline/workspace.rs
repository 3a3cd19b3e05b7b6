use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Per-source scratch directory. Removed by [`close`](Self::close), or on
/// drop if processing bails out early.
pub struct ScratchWorkspace {
    dir: TempDir,
    tree: PathBuf,
}

impl ScratchWorkspace {
    pub const PREFIX: &'static str = "presetsync-";

    /// Create a uniquely named directory under `root` with an empty `tree/`
    /// subdirectory to extract into.
    pub fn create(root: &Path, source_id: &str) -> io::Result<Self> {
        let label: String = source_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}{label}-", Self::PREFIX))
            .tempdir_in(root)?;
        let tree = dir.path().join("tree");
        std::fs::create_dir(&tree)?;
        Ok(Self { dir, tree })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the extracted tree goes.
    pub fn tree(&self) -> &Path {
        &self.tree
    }

    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspaces_are_unique_and_removed() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchWorkspace::create(root.path(), "local:pack one").unwrap();
        let b = ScratchWorkspace::create(root.path(), "local:pack one").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.tree().is_dir());
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("presetsync-local-pack-one-"), "{name}");

        a.close().unwrap();
        drop(b);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
