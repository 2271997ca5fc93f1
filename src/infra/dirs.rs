//! Platform-specific directory management
//!
//! Source archives are shared between environments through a download
//! cache; user recipe definitions can live in the config directory.
//! Follows the XDG Base Directory Specification on Linux.
//!
//! Environment variables can override default directories:
//! - `LSBROOT_CACHE_DIR` - Override cache directory
//! - `LSBROOT_CONFIG_DIR` - Override config directory

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CACHE_DIR: &str = "LSBROOT_CACHE_DIR";
pub const ENV_CONFIG_DIR: &str = "LSBROOT_CONFIG_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "lsbroot";

const DOWNLOADS_SUBDIR: &str = "downloads";
const RECIPES_SUBDIR: &str = "recipes";

/// Platform-specific directory provider
#[derive(Debug, Clone)]
pub struct LsbrootDirs {
    cache_dir: PathBuf,
    config_dir: PathBuf,
}

impl LsbrootDirs {
    /// Resolve directories from the environment, then platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve(ENV_CACHE_DIR, dirs::cache_dir, ".cache"),
            config_dir: Self::resolve(ENV_CONFIG_DIR, dirs::config_dir, ".config"),
        }
    }

    /// Directories rooted at explicit paths
    #[must_use]
    pub fn with_paths(cache_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            config_dir,
        }
    }

    /// Cache directory
    ///
    /// - Linux: `$XDG_CACHE_HOME/lsbroot` or `~/.cache/lsbroot`
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Shared download cache for source archives
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join(DOWNLOADS_SUBDIR)
    }

    /// User recipe definitions applied to every environment
    #[must_use]
    pub fn user_recipes_dir(&self) -> PathBuf {
        self.config_dir.join(RECIPES_SUBDIR)
    }

    fn resolve(var: &str, platform: fn() -> Option<PathBuf>, fallback: &str) -> PathBuf {
        if let Ok(path) = env::var(var) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        platform().map(|p| p.join(APP_NAME)).unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(fallback)
                .join(APP_NAME)
        })
    }
}

impl Default for LsbrootDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_creates_instance() {
        let dirs = LsbrootDirs::new();
        assert!(!dirs.cache_dir().as_os_str().is_empty());
        assert!(!dirs.config_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_downloads_dir_is_under_cache_dir() {
        let dirs = LsbrootDirs::new();
        assert!(dirs.downloads_dir().starts_with(dirs.cache_dir()));
    }

    #[test]
    fn test_with_paths() {
        let dirs = LsbrootDirs::with_paths(PathBuf::from("/c"), PathBuf::from("/k"));
        assert_eq!(dirs.downloads_dir(), PathBuf::from("/c/downloads"));
        assert_eq!(dirs.user_recipes_dir(), PathBuf::from("/k/recipes"));
    }
}
