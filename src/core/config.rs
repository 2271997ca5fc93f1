//! Session configuration
//!
//! Reads `lsbroot.toml` from the environment root. The file is written by
//! `lsbroot init` and carries everything a later session needs to rebuild
//! the same environment: target, architecture, catalog location, make
//! jobs, symbol ceilings and the download cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::compat::SymbolConstraint;
use crate::core::target::Arch;
use crate::error::{ConfigError, VerifyError};
use crate::infra::dirs::LsbrootDirs;
use crate::infra::filesystem;

/// Contents of `lsbroot.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Target identifier
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default = "Arch::host")]
    pub arch: Arch,

    /// Directory of user recipe files, relative to the root unless absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_dir: Option<PathBuf>,

    /// Parallel make jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Download cache; defaults to the platform cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Symbol-version ceilings by namespace, e.g. `GLIBC = "2.3.4"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, String>,
}

fn default_target() -> String {
    defaults::DEFAULT_TARGET.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            arch: Arch::host(),
            catalog_dir: None,
            jobs: None,
            cache_dir: None,
            constraints: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Config file location for an environment root
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(defaults::CONFIG_FILE)
    }

    /// Load the config of `root`
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        Self::load_from_path(&Self::path_for(root))
    }

    /// Load from a specific path
    ///
    /// A missing file yields the default configuration; an unreadable or
    /// invalid one is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Write to `lsbroot.toml` under `root`
    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        let path = Self::path_for(root);
        let write_err = |error: String| ConfigError::Write {
            path: path.clone(),
            error,
        };
        let content = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        filesystem::write_atomic(&path, &content).map_err(|e| write_err(e.to_string()))
    }

    /// Make jobs, falling back to the number of CPUs
    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(defaults::default_build_jobs).max(1)
    }

    /// User catalog directory, resolved against `root`
    pub fn catalog_dir(&self, root: &Path) -> Option<PathBuf> {
        self.catalog_dir.as_ref().map(|dir| root.join(dir))
    }

    /// Download cache directory
    pub fn download_dir(&self, root: &Path, dirs: &LsbrootDirs) -> PathBuf {
        self.cache_dir
            .as_ref()
            .map_or_else(|| dirs.downloads_dir(), |dir| root.join(dir))
    }

    /// Target ceilings with the configured namespaces replacing or adding
    /// entries
    pub fn effective_constraints(
        &self,
        target_defaults: Vec<SymbolConstraint>,
    ) -> Result<Vec<SymbolConstraint>, VerifyError> {
        let mut constraints: Vec<SymbolConstraint> = target_defaults
            .into_iter()
            .filter(|c| !self.constraints.contains_key(&c.namespace))
            .collect();
        for (namespace, max) in &self.constraints {
            constraints.push(SymbolConstraint::parse(namespace, max)?);
        }
        Ok(constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = SessionConfig::load(temp.path()).unwrap();
        assert_eq!(config.target, "linux");
        assert!(config.constraints.is_empty());
        assert!(config.jobs() >= 1);
    }

    #[test]
    fn test_parse_full_config() {
        let config: SessionConfig = toml::from_str(
            r#"
target = "linux"
arch = "64bit"
catalog_dir = "recipes"
jobs = 3

[constraints]
GLIBC = "2.4"
"#,
        )
        .unwrap();

        assert_eq!(config.arch, Arch::Bits64);
        assert_eq!(config.jobs(), 3);
        assert_eq!(
            config.catalog_dir(Path::new("/env")),
            Some(PathBuf::from("/env/recipes"))
        );
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let temp = TempDir::new().unwrap();
        filesystem::write_file(&SessionConfig::path_for(temp.path()), "colour = true\n").unwrap();
        assert!(matches!(
            SessionConfig::load(temp.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let config = SessionConfig {
            arch: Arch::Bits32,
            jobs: Some(2),
            ..SessionConfig::default()
        };
        config.save(temp.path()).unwrap();

        assert_eq!(SessionConfig::load(temp.path()).unwrap(), config);
    }

    #[test]
    fn test_configured_constraints_replace_defaults() {
        let mut config = SessionConfig::default();
        config
            .constraints
            .insert("GLIBC".to_string(), "2.4".to_string());

        let effective = config
            .effective_constraints(SymbolConstraint::defaults())
            .unwrap();

        assert_eq!(effective.len(), 2);
        assert!(effective.contains(&SymbolConstraint::parse("GLIBC", "2.4").unwrap()));
        assert!(effective.contains(&SymbolConstraint::parse("GLIBCXX", "3.4.7").unwrap()));
    }

    #[test]
    fn test_invalid_constraint() {
        let mut config = SessionConfig::default();
        config
            .constraints
            .insert("GLIBC".to_string(), "two".to_string());
        assert!(config.effective_constraints(Vec::new()).is_err());
    }

    #[test]
    fn test_download_dir() {
        let dirs = LsbrootDirs::with_paths(PathBuf::from("/cache"), PathBuf::from("/cfg"));
        let mut config = SessionConfig::default();
        assert_eq!(
            config.download_dir(Path::new("/env"), &dirs),
            PathBuf::from("/cache/downloads")
        );
        config.cache_dir = Some(PathBuf::from("/srv/dl"));
        assert_eq!(
            config.download_dir(Path::new("/env"), &dirs),
            PathBuf::from("/srv/dl")
        );
    }
}
