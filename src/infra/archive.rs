//! Archive extraction
//!
//! Source archives are unpacked with the host `tar` and `unzip` through the
//! command runner, so extraction is logged and testable like every other
//! recipe command.

use std::path::{Path, PathBuf};

use crate::core::build_env::EnvMap;
use crate::error::FetchError;
use crate::infra::filesystem;
use crate::infra::process::{CommandRunner, CommandSpec};

/// Supported archive layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Any tarball; `tar` detects the compression itself
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from the file name
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        const TAR_SUFFIXES: &[&str] = &[
            ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tbz", ".tar.xz", ".txz",
        ];
        if TAR_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            Some(ArchiveFormat::Tar)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }

    fn command(self, archive: &Path, dest: &Path) -> CommandSpec {
        match self {
            ArchiveFormat::Tar => CommandSpec::new("tar")
                .arg("-xf")
                .path_arg(archive)
                .arg("-C")
                .path_arg(dest),
            ArchiveFormat::Zip => CommandSpec::new("unzip")
                .arg("-q")
                .arg("-o")
                .path_arg(archive)
                .arg("-d")
                .path_arg(dest),
        }
    }
}

/// Unpacks source archives into working directories
pub trait ArchiveExtractor {
    /// Extract `archive` into a clean `dest` and return the source root
    fn extract(&self, archive: &Path, dest: &Path) -> Result<PathBuf, FetchError>;
}

/// Extractor running the host tools through a [`CommandRunner`]
pub struct ToolExtractor<'a> {
    runner: &'a dyn CommandRunner,
    env: &'a EnvMap,
}

impl<'a> ToolExtractor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, env: &'a EnvMap) -> Self {
        Self { runner, env }
    }
}

impl ArchiveExtractor for ToolExtractor<'_> {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<PathBuf, FetchError> {
        let failed = |error: String| FetchError::ExtractFailed {
            archive: archive.to_path_buf(),
            error,
        };

        let format = ArchiveFormat::detect(archive)
            .ok_or_else(|| failed("unrecognized archive format".to_string()))?;

        filesystem::recreate_dir(dest).map_err(|e| failed(e.to_string()))?;

        tracing::debug!("Extracting {} into {}", archive.display(), dest.display());
        self.runner
            .run(self.env, &format.command(archive, dest))
            .map_err(|e| failed(e.to_string()))?;

        source_root(dest).map_err(|e| failed(e.to_string()))
    }
}

/// The single top-level directory of an extracted tree, or the tree itself
pub fn source_root(dest: &Path) -> std::io::Result<PathBuf> {
    let mut entries = std::fs::read_dir(dest)?.collect::<Result<Vec<_>, _>>()?;
    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        if let Some(entry) = entries.pop() {
            return Ok(entry.path());
        }
    }
    Ok(dest.to_path_buf())
}
