//! Mount table access.
//!
//! Mount points are read from `/proc/self/mountinfo`. Directories missing
//! from the table are still recognised as mount points when they sit on a
//! different device than their parent.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Filesystem types whose root has no local storage behind it.
const NETWORK_FS_TYPES: &[&str] = &[
    "9p",
    "afs",
    "ceph",
    "cifs",
    "davfs",
    "fuse.gvfsd-fuse",
    "fuse.rclone",
    "fuse.sshfs",
    "glusterfs",
    "lustre",
    "ncpfs",
    "smb3",
    "smbfs",
    "sshfs",
];

/// One mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Directory the filesystem is attached to.
    pub mount_point: PathBuf,
    /// Filesystem type as reported by the kernel (`ext4`, `nfs4`, ...).
    pub fs_type: String,
    /// Mount source (`/dev/sda1`, `server:/export`, ...).
    pub source: String,
}

impl MountEntry {
    pub fn new(
        mount_point: impl Into<PathBuf>,
        fs_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            mount_point: mount_point.into(),
            fs_type: fs_type.into(),
            source: source.into(),
        }
    }

    /// Whether data written below this mount lands on local storage.
    pub fn is_local(&self) -> bool {
        let fs_type = self.fs_type.as_str();
        !(fs_type.starts_with("nfs") || NETWORK_FS_TYPES.contains(&fs_type))
    }
}

/// Source of mount information used by the resolver.
pub trait MountLookup: Send + Sync {
    /// The mount whose mount point is the longest prefix of `path`.
    fn enclosing_mount(&self, path: &Path) -> Option<MountEntry>;

    /// The mount attached exactly at `dir`, if any.
    fn mount_at(&self, dir: &Path) -> Option<MountEntry>;
}

/// A parsed snapshot of the mount table.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn from_entries(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    /// Parse the contents of a `mountinfo` file.
    pub fn parse_mountinfo(input: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for line in input.lines().filter(|line| !line.trim().is_empty()) {
            let (left, right) = line.split_once(" - ").ok_or_else(|| invalid_line(line))?;

            let mount_point = left
                .split_whitespace()
                .nth(4)
                .ok_or_else(|| invalid_line(line))?;

            let mut right_fields = right.split_whitespace();
            let fs_type = right_fields.next().ok_or_else(|| invalid_line(line))?;
            let source = right_fields.next().unwrap_or("none");

            entries.push(MountEntry::new(
                unescape_mount_field(mount_point),
                fs_type,
                unescape_mount_field(source),
            ));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// Later entries shadow earlier ones mounted on the same directory.
    pub fn find(&self, dir: &Path) -> Option<&MountEntry> {
        self.entries.iter().rev().find(|entry| entry.mount_point == dir)
    }

    /// Deepest mount point containing `path`; the latest entry wins a tie.
    pub fn longest_prefix(&self, path: &Path) -> Option<&MountEntry> {
        self.entries
            .iter()
            .filter(|entry| path.starts_with(&entry.mount_point))
            .max_by_key(|entry| entry.mount_point.components().count())
    }
}

impl MountLookup for MountTable {
    fn enclosing_mount(&self, path: &Path) -> Option<MountEntry> {
        self.longest_prefix(path).cloned()
    }

    fn mount_at(&self, dir: &Path) -> Option<MountEntry> {
        self.find(dir).cloned()
    }
}

/// Mount information of the running system.
#[derive(Debug, Clone, Default)]
pub struct SystemMounts {
    table: MountTable,
}

impl SystemMounts {
    /// Read the current mount table.
    ///
    /// An unreadable table leaves only device-boundary detection.
    pub fn load() -> Self {
        let table = fs::read_to_string(MOUNTINFO_PATH)
            .map_err(Error::from)
            .and_then(|raw| MountTable::parse_mountinfo(&raw))
            .unwrap_or_else(|e| {
                warn!("Could not read mount table: {}", e);
                MountTable::default()
            });

        Self { table }
    }
}

impl MountLookup for SystemMounts {
    fn enclosing_mount(&self, path: &Path) -> Option<MountEntry> {
        self.table.enclosing_mount(path)
    }

    fn mount_at(&self, dir: &Path) -> Option<MountEntry> {
        if let Some(entry) = self.table.find(dir) {
            return Some(entry.clone());
        }
        if is_device_boundary(dir) {
            return Some(MountEntry::new(dir, "unknown", "none"));
        }
        None
    }
}

/// True when `dir` lives on another device than its parent, or is the root.
#[cfg(unix)]
fn is_device_boundary(dir: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(own) = fs::metadata(dir) else {
        return false;
    };
    match dir.parent() {
        Some(parent) => fs::metadata(parent)
            .map(|meta| meta.dev() != own.dev())
            .unwrap_or(false),
        None => true,
    }
}

#[cfg(not(unix))]
fn is_device_boundary(dir: &Path) -> bool {
    dir.parent().is_none()
}

fn invalid_line(line: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("invalid mountinfo line: {}", line),
    ))
}

/// Decode the `\040`-style octal escapes the kernel uses for spaces etc.
fn unescape_mount_field(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 4 <= bytes.len()
            && bytes[index + 1..index + 4].iter().all(u8::is_ascii_digit)
        {
            if let Ok(num) = u8::from_str_radix(&value[index + 1..index + 4], 8) {
                output.push(num);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}
