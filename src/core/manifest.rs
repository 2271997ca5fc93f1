//! Install manifest
//!
//! The manifest (`.lsbroot/manifest.toml`) records which recipes completed
//! in an environment, for which configuration, and which files they
//! installed. It is the only state carried between sessions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::defaults;
use crate::core::target::Arch;
use crate::error::ManifestError;
use crate::infra::filesystem;

/// Manifest file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallManifest {
    /// Manifest format version
    pub version: u32,

    /// Completed recipes
    #[serde(default)]
    pub recipes: BTreeMap<String, InstalledRecipe>,
}

/// A recorded recipe entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstalledRecipe {
    pub completed: bool,

    /// Target identifier the recipe was built for
    pub target: String,

    pub arch: Arch,

    /// Checksum of the source archive, when one was declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Seconds since the Unix epoch
    #[serde(default)]
    pub recorded_at: u64,

    /// Installed files, relative to the environment root
    #[serde(default)]
    pub files: Vec<String>,
}

impl InstalledRecipe {
    /// Completed entry stamped with the current time
    pub fn completed(target: &str, arch: Arch, checksum: Option<String>, files: Vec<String>) -> Self {
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            completed: true,
            target: target.to_string(),
            arch,
            checksum,
            recorded_at,
            files,
        }
    }

    /// Recorded files that no longer exist under `root`
    pub fn missing_files(&self, root: &Path) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| root.join(f).symlink_metadata().is_err())
            .cloned()
            .collect()
    }
}

/// Whether a recipe can be skipped in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    /// Recorded for this configuration and every file is present
    Installed,
    /// No completed entry
    NotRecorded,
    /// Recorded for a different target or architecture
    ConfigMismatch { target: String, arch: Arch },
    /// Recorded, but some files are gone
    MissingFiles(Vec<String>),
}

impl InstallState {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallState::Installed)
    }
}

impl InstallManifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self {
            version: defaults::MANIFEST_VERSION,
            recipes: BTreeMap::new(),
        }
    }

    /// Manifest location for an environment root
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(defaults::STATE_DIR).join(defaults::MANIFEST_FILE)
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load from `path`; a missing file is an empty manifest
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Persist to `path`, atomically replacing any previous manifest
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let content = self.to_toml().map_err(|e| ManifestError::Write {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        filesystem::write_atomic(path, &content).map_err(|e| ManifestError::Write {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Record a completed recipe, replacing any earlier entry
    pub fn record(&mut self, name: &str, entry: InstalledRecipe) {
        self.recipes.insert(name.to_string(), entry);
    }

    /// Drop a recipe's entry
    pub fn forget(&mut self, name: &str) -> Option<InstalledRecipe> {
        self.recipes.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&InstalledRecipe> {
        self.recipes.get(name)
    }

    /// Decide whether `name` is installed for `target`/`arch` under `root`
    pub fn install_state(&self, name: &str, target: &str, arch: Arch, root: &Path) -> InstallState {
        let Some(entry) = self.recipes.get(name).filter(|e| e.completed) else {
            return InstallState::NotRecorded;
        };
        if entry.target != target || entry.arch != arch {
            return InstallState::ConfigMismatch {
                target: entry.target.clone(),
                arch: entry.arch,
            };
        }
        let missing = entry.missing_files(root);
        if missing.is_empty() {
            InstallState::Installed
        } else {
            InstallState::MissingFiles(missing)
        }
    }
}

impl Default for InstallManifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parses_documented_format() {
        let manifest = InstallManifest::from_toml(
            r#"
version = 1

[recipes.patchelf]
completed = true
target = "linux"
arch = "32bit"
files = ["local/bin/patchelf", "local/share/man/man1/patchelf.1"]
"#,
        )
        .unwrap();

        let entry = manifest.get("patchelf").unwrap();
        assert!(entry.completed);
        assert_eq!(entry.arch, Arch::Bits32);
        assert_eq!(entry.files.len(), 2);
        assert_eq!(entry.recorded_at, 0);
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let temp = TempDir::new().unwrap();
        let manifest = InstallManifest::load(&InstallManifest::path_for(temp.path())).unwrap();
        assert!(manifest.recipes.is_empty());
        assert_eq!(manifest.version, 1);
    }

    #[test]
    fn test_corrupt_manifest_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = InstallManifest::path_for(temp.path());
        filesystem::write_file(&path, "recipes = 5").unwrap();

        assert!(matches!(
            InstallManifest::load(&path),
            Err(ManifestError::Parse { .. })
        ));
    }

    #[test]
    fn test_install_state_checks_files_and_config() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        filesystem::write_file(&root.join("local/lib/libz.so.1"), "elf").unwrap();

        let mut manifest = InstallManifest::new();
        manifest.record(
            "lib_zlib",
            InstalledRecipe::completed("linux", Arch::Bits32, None, vec!["local/lib/libz.so.1".to_string()]),
        );

        assert!(manifest
            .install_state("lib_zlib", "linux", Arch::Bits32, root)
            .is_installed());
        assert!(matches!(
            manifest.install_state("lib_zlib", "linux", Arch::Bits64, root),
            InstallState::ConfigMismatch { .. }
        ));
        assert_eq!(
            manifest.install_state("other", "linux", Arch::Bits32, root),
            InstallState::NotRecorded
        );

        std::fs::remove_file(root.join("local/lib/libz.so.1")).unwrap();
        assert_eq!(
            manifest.install_state("lib_zlib", "linux", Arch::Bits32, root),
            InstallState::MissingFiles(vec!["local/lib/libz.so.1".to_string()])
        );
    }

    #[test]
    fn test_incomplete_entry_is_not_installed() {
        let temp = TempDir::new().unwrap();
        let mut manifest = InstallManifest::new();
        let mut entry = InstalledRecipe::completed("linux", Arch::Bits32, None, vec![]);
        entry.completed = false;
        manifest.record("x", entry);

        assert_eq!(
            manifest.install_state("x", "linux", Arch::Bits32, temp.path()),
            InstallState::NotRecorded
        );
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = InstallManifest::path_for(temp.path());

        let mut manifest = InstallManifest::new();
        manifest.record(
            "x",
            InstalledRecipe::completed(
                "linux",
                Arch::Bits64,
                Some("md5:5087261514b4b5814a39c3d3a36eb6ef".to_string()),
                vec!["local/a".to_string(), "local/b".to_string()],
            ),
        );
        manifest.save(&path).unwrap();

        let reloaded = InstallManifest::load(&path).unwrap();
        assert_eq!(reloaded, manifest);
        assert_eq!(reloaded.get("x").unwrap().files, vec!["local/a", "local/b"]);
    }
}
