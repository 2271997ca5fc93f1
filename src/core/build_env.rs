//! Build environment setup
//!
//! Composes the environment every recipe command runs with: the inherited
//! process environment, the target's compiler selection, and its search
//! paths. The result is an immutable [`EnvMap`] built once per session;
//! per-command overrides are layered on top with [`EnvMap::merged`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::target::Target;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Separator of colon-joined search variables
const PATH_SEPARATOR: char = ':';

/// Variables held back from the session environment and only handed to
/// recipe commands
const RECIPE_ONLY_VARS: &[&str] = &["LD_LIBRARY_PATH"];

/// Environment variable mapping with unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap {
    vars: BTreeMap<String, String>,
}

impl EnvMap {
    /// Empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Set a variable, replacing any previous value
    #[must_use]
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Insert a directory into a colon-joined variable
    ///
    /// Existing entries are kept; an entry already present is not added
    /// again. `position` is clamped to the current entry count.
    #[must_use]
    pub fn with_path_entry(mut self, key: &str, entry: &str, position: usize) -> Self {
        let value = insert_path_entry(self.vars.get(key).map(String::as_str), entry, position);
        self.vars.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Copy of this mapping with `overrides` applied (override wins)
    pub fn merged<'a, I>(&self, overrides: I) -> EnvMap
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        let mut vars = self.vars.clone();
        for (key, value) in overrides {
            vars.insert(key.clone(), value.clone());
        }
        EnvMap { vars }
    }
}

/// Insert `entry` into a colon-joined list at `position`
///
/// Empty components are dropped. When `entry` is already present the list
/// is returned unchanged.
pub fn insert_path_entry(existing: Option<&str>, entry: &str, position: usize) -> String {
    let mut entries: Vec<&str> = existing
        .unwrap_or_default()
        .split(PATH_SEPARATOR)
        .filter(|e| !e.is_empty())
        .collect();

    if !entries.contains(&entry) {
        let index = position.min(entries.len());
        entries.insert(index, entry);
    }

    entries.join(&PATH_SEPARATOR.to_string())
}

/// Session environment for one target
///
/// Owns the resolved target and the composed environment. Construction
/// guarantees that the install prefix and its `lib` directory exist.
#[derive(Debug)]
pub struct BuildEnvironment {
    root: PathBuf,
    target: Box<dyn Target>,
    env: EnvMap,
    recipe_vars: Vec<(String, String)>,
}

impl BuildEnvironment {
    /// Create the prefix tree and compose the session environment
    ///
    /// Idempotent: an existing prefix is left untouched.
    pub fn initialize(
        root: &Path,
        target: Box<dyn Target>,
        inherited: EnvMap,
    ) -> Result<Self, FilesystemError> {
        filesystem::create_dir_all(&target.prefix().join(defaults::PREFIX_LIB_DIR))?;

        let env = compose_session_env(target.as_ref(), inherited);
        let recipe_vars = target
            .path_variables()
            .into_iter()
            .filter(|(key, _)| RECIPE_ONLY_VARS.contains(&key.as_str()))
            .collect();

        tracing::debug!(
            "Initialized {} environment for {} at {}",
            target.id(),
            target.arch(),
            target.prefix().display()
        );

        Ok(Self {
            root: root.to_path_buf(),
            target,
            env,
            recipe_vars,
        })
    }

    /// Environment root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Install prefix
    pub fn prefix(&self) -> &Path {
        self.target.prefix()
    }

    pub fn target(&self) -> &dyn Target {
        self.target.as_ref()
    }

    /// Immutable session environment
    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// Variables that only recipe build commands receive
    pub fn recipe_vars(&self) -> &[(String, String)] {
        &self.recipe_vars
    }

    /// Per-recipe working directory
    pub fn workdir(&self, recipe: &str) -> PathBuf {
        self.root.join(defaults::BUILD_DIR).join(recipe)
    }

    /// Per-recipe command log
    pub fn log_path(&self, recipe: &str) -> PathBuf {
        self.root
            .join(defaults::BUILD_DIR)
            .join(defaults::LOGS_SUBDIR)
            .join(format!("{recipe}.log"))
    }
}

/// Layer the target's variables over the inherited environment
fn compose_session_env(target: &dyn Target, inherited: EnvMap) -> EnvMap {
    let mut env = inherited;

    for (key, value) in target.compiler_flags().to_pairs() {
        env = env.with_var(key, &value);
    }

    for (index, dir) in target.executable_paths().iter().enumerate() {
        env = env.with_path_entry("PATH", &dir.display().to_string(), index);
    }

    for (key, value) in target.path_variables() {
        if RECIPE_ONLY_VARS.contains(&key.as_str()) {
            continue;
        }
        if key == "PKG_CONFIG_PATH" {
            for (index, dir) in value.split(PATH_SEPARATOR).enumerate() {
                env = env.with_path_entry(&key, dir, index);
            }
        } else {
            env = env.with_var(&key, &value);
        }
    }

    env
}
