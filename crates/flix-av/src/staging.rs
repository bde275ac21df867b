//! Atomic staging of artifacts.
//!
//! A [`Staging`] area is a temporary directory created next to the final
//! location, so committing is a same-filesystem rename. Readers see either
//! nothing or the complete artifact. If a `Staging` is dropped without being
//! committed, everything written into it is removed.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Prefix of staging directory names; used to sweep leftovers.
pub const STAGING_PREFIX: &str = ".staging-";

/// Temporary area for building one artifact.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
    target: PathBuf,
}

impl Staging {
    /// Create a staging area for `target` in `target`'s parent directory.
    pub fn for_target(target: &Path) -> flix_core::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            flix_core::Error::Internal(format!("{} has no parent directory", target.display()))
        })?;
        std::fs::create_dir_all(parent)?;

        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)?;

        Ok(Self {
            dir,
            target: target.to_path_buf(),
        })
    }

    /// The staging directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a named file inside the staging area.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Move the staged file `name` to the target path.
    ///
    /// The staging directory is removed afterwards.
    pub fn commit_file(self, name: &str) -> flix_core::Result<PathBuf> {
        let staged = self.path_for(name);
        if !staged.is_file() {
            return Err(flix_core::Error::Internal(format!(
                "staged file does not exist: {}",
                staged.display()
            )));
        }
        std::fs::rename(&staged, &self.target)?;
        Ok(self.target)
    }

    /// Rename the whole staging directory to the target path, replacing any
    /// directory already there.
    pub fn commit_dir(self) -> flix_core::Result<PathBuf> {
        if self.target.is_dir() {
            std::fs::remove_dir_all(&self.target)?;
        }
        std::fs::rename(self.dir.path(), &self.target)?;
        // The TempDir's own cleanup now finds nothing to remove.
        drop(self.dir);
        Ok(self.target)
    }
}

/// Remove staging directories left in `parent` by an interrupted process.
/// Returns the number removed.
pub fn sweep_stale(parent: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(parent) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        match std::fs::remove_dir_all(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Failed to remove stale staging dir {:?}: {e}", name),
        }
    }
    removed
}
