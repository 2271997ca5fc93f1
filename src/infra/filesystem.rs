//! Filesystem operations
//!
//! Handles file and directory operations, atomic replacement and prefix
//! snapshots used to find out what a recipe installed.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Remove a directory tree and recreate it empty
pub fn recreate_dir(path: &Path) -> Result<(), FilesystemError> {
    remove_dir_all(path)?;
    create_dir_all(path)
}

/// Write content to a file
pub fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content to a sibling temp file, then rename it over `path`
///
/// Readers see either the previous content or the new one, never a
/// truncated file.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), FilesystemError> {
    let write_err = |e: std::io::Error| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.tmp"));

    {
        let mut file = std::fs::File::create(&tmp).map_err(write_err)?;
        file.write_all(content.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
    }
    std::fs::rename(&tmp, path).map_err(write_err)
}

/// Append text to a file, creating it when missing
pub fn append_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    file.write_all(content.as_bytes())
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

/// Read raw bytes from a file
pub fn read_bytes(path: &Path) -> Result<Vec<u8>, FilesystemError> {
    std::fs::read(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Unix permission bits of a file
#[cfg(unix)]
pub fn file_mode(path: &Path) -> Result<u32, FilesystemError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode())
        .map_err(|e| FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

/// Set Unix permission bits on a file
#[cfg(unix)]
pub fn set_file_mode(path: &Path, mode: u32) -> Result<(), FilesystemError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        FilesystemError::Permissions {
            path: path.to_path_buf(),
            error: e.to_string(),
        }
    })
}

/// Permission bits approximated from the read-only flag
#[cfg(not(unix))]
pub fn file_mode(path: &Path) -> Result<u32, FilesystemError> {
    std::fs::metadata(path)
        .map(|m| if m.permissions().readonly() { 0o444 } else { 0o644 })
        .map_err(|e| FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

/// Only the owner write bit is honoured, as the read-only flag
#[cfg(not(unix))]
pub fn set_file_mode(path: &Path, mode: u32) -> Result<(), FilesystemError> {
    let permissions_error = |e: std::io::Error| FilesystemError::Permissions {
        path: path.to_path_buf(),
        error: e.to_string(),
    };
    let mut perms = std::fs::metadata(path).map_err(permissions_error)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    std::fs::set_permissions(path, perms).map_err(permissions_error)
}

/// Size and modification time of one snapshotted entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Listing of every non-directory entry below a directory
///
/// Paths are stored relative to a base directory so two snapshots of the
/// same tree can be compared and recorded portably.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSnapshot {
    entries: BTreeMap<PathBuf, FileStamp>,
}

impl FileSnapshot {
    /// Snapshot every file and symlink under `dir`, keyed relative to `base`
    ///
    /// A missing `dir` yields an empty snapshot. Symlinks are listed but
    /// never followed.
    pub fn capture(dir: &Path, base: &Path) -> Result<Self, FilesystemError> {
        let mut entries = BTreeMap::new();
        if !dir.exists() {
            return Ok(Self { entries });
        }

        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(|e| FilesystemError::ReadFile {
                path: dir.to_path_buf(),
                error: e.to_string(),
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let meta = entry.metadata().map_err(|e| FilesystemError::ReadFile {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
            let rel = entry
                .path()
                .strip_prefix(base)
                .unwrap_or(entry.path())
                .to_path_buf();
            entries.insert(
                rel,
                FileStamp {
                    len: meta.len(),
                    modified: meta.modified().ok(),
                },
            );
        }
        Ok(Self { entries })
    }

    /// Entries that are new in `after` or changed since `self`, sorted
    pub fn changed_since(&self, after: &FileSnapshot) -> Vec<PathBuf> {
        after
            .entries
            .iter()
            .filter(|(path, stamp)| self.entries.get(*path) != Some(*stamp))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
