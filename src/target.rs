//! Wipe targets supplied by the caller.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Whether a target is wiped as a single file or recursively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Directory,
}

/// An absolute local path scheduled for wiping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeTarget {
    pub path: PathBuf,
    pub kind: TargetKind,
}

impl WipeTarget {
    /// Create a target without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>, kind: TargetKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Build a target from a caller-supplied path.
    ///
    /// Symlinks are classified as files so they are unlinked, never
    /// followed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_local(path)?;

        let metadata = std::fs::symlink_metadata(path)?;
        let kind = if metadata.is_dir() {
            TargetKind::Directory
        } else {
            TargetKind::File
        };

        Ok(Self::new(path, kind))
    }

    /// Build targets for a list of paths, failing on the first bad one.
    pub fn from_paths<I, P>(paths: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().map(Self::from_path).collect()
    }

    pub fn is_dir(&self) -> bool {
        self.kind == TargetKind::Directory
    }
}

impl fmt::Display for WipeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Reject paths that are not locally addressable.
pub(crate) fn ensure_local(path: &Path) -> Result<()> {
    let text = path.to_string_lossy();
    if text.contains("://") {
        return Err(Error::UnsupportedLocation(text.into_owned()));
    }
    if !path.is_absolute() {
        return Err(Error::UnsupportedLocation(format!(
            "{} is not an absolute path",
            text
        )));
    }
    Ok(())
}
