//! Mount point resolution.
//!
//! Fill operations work once per filesystem, so a batch of user paths is
//! reduced to one work directory per distinct mount point.

mod table;

pub use table::{MountEntry, MountLookup, MountTable, SystemMounts};

use crate::error::{Error, Result};
use crate::target::ensure_local;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Canonical path of a mount point, used to deduplicate work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountKey(PathBuf);

impl MountKey {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for MountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Result of [`filter_to_one_per_mount`].
///
/// Both vectors have the same length; `work_paths[i]` lives on `mounts[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredPaths {
    pub work_paths: Vec<PathBuf>,
    pub mounts: Vec<MountKey>,
}

impl FilteredPaths {
    pub fn len(&self) -> usize {
        self.work_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.work_paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &MountKey)> {
        self.work_paths.iter().zip(self.mounts.iter())
    }
}

/// Find the mount point of the filesystem containing `path`.
///
/// The enclosing-mount lookup is tried first. When it finds nothing, or
/// finds a network mount, the directories above `path` are checked one
/// level at a time until a mount point turns up or the root is passed.
pub fn resolve_mountpoint(path: &Path, lookup: &dyn MountLookup) -> Result<MountKey> {
    resolve_with_dir(path, lookup).map(|(mount, _)| mount)
}

/// Resolve `path` and also return the canonical directory it stands for:
/// the directory itself, or the parent of anything else (symlinks
/// included).
fn resolve_with_dir(path: &Path, lookup: &dyn MountLookup) -> Result<(MountKey, PathBuf)> {
    ensure_local(path)?;
    let (location, is_dir) = canonical_location(path)?;
    let dir = if is_dir {
        location.clone()
    } else {
        location.parent().map(Path::to_path_buf).unwrap_or_else(|| location.clone())
    };

    match lookup.enclosing_mount(&location) {
        Some(entry) if entry.is_local() => return Ok((MountKey(entry.mount_point), dir)),
        Some(entry) => debug!(
            "Enclosing mount {} of {} is not local, walking up",
            entry.mount_point.display(),
            location.display()
        ),
        None => debug!("No enclosing mount for {}, walking up", location.display()),
    }

    let mut current = dir.clone();

    loop {
        if let Some(entry) = lookup.mount_at(&current) {
            return if entry.is_local() {
                Ok((MountKey(entry.mount_point), dir))
            } else {
                Err(Error::RemoteMount(entry.mount_point))
            };
        }

        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return Err(Error::MissingMount(path.to_path_buf())),
        }
    }
}

/// Keep the first path seen per mount point.
///
/// Anything that is not a directory (symlinks included) is replaced by its
/// canonical parent directory, which can never be above its own mount
/// point. Fails as a whole if any path cannot be resolved.
pub fn filter_to_one_per_mount<I, P>(paths: I, lookup: &dyn MountLookup) -> Result<FilteredPaths>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut seen = HashSet::new();
    let mut filtered = FilteredPaths::default();

    for path in paths {
        let path = path.as_ref();
        let (mount, work_path) = resolve_with_dir(path, lookup)?;

        if !seen.insert(mount.clone()) {
            debug!("{} shares mount {}, skipping", path.display(), mount);
            continue;
        }

        filtered.work_paths.push(work_path);
        filtered.mounts.push(mount);
    }

    Ok(filtered)
}

/// Canonical form of `path` without following a final symlink.
fn canonical_location(path: &Path) -> Result<(PathBuf, bool)> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        return Ok((fs::canonicalize(path)?, true));
    }

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok((fs::canonicalize(parent)?.join(name), false)),
        _ => Ok((fs::canonicalize(path)?, false)),
    }
}
