//! Recipe definition handling
//!
//! A recipe describes how one third-party library or tool is fetched,
//! patched, configured, built and installed into the environment prefix.
//! Definitions are declarative TOML; see [`crate::core::catalog`] for how
//! they are loaded and merged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::patch::PatchSpec;
use crate::core::target::Arch;
use crate::error::CatalogError;

fn default_true() -> bool {
    true
}

/// Complete recipe definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecipeDefinition {
    /// Unique recipe name
    pub name: String,

    /// Upstream version, informational
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Source archive; absent for meta recipes
    #[serde(default)]
    pub source: Option<SourceSpec>,

    /// How the recipe is configured, built and installed
    #[serde(default)]
    pub build_system: BuildSystem,

    /// Build-time dependencies, installed before this recipe builds
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Run-time dependencies, installed in the same session
    #[serde(default)]
    pub runtime_dependencies: Vec<String>,

    /// Line-rewriting patches, applied in declared order per stage
    #[serde(default)]
    pub patches: Vec<PatchSpec>,

    /// Build step customization
    #[serde(default)]
    pub build: BuildOptions,

    /// Strip installed artifacts
    #[serde(default = "default_true")]
    pub strip: bool,

    /// Run installed artifacts through symbol checks and rpath rewriting
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl RecipeDefinition {
    /// Minimal definition with no source and default build settings
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            description: None,
            source: None,
            build_system: BuildSystem::default(),
            dependencies: Vec::new(),
            runtime_dependencies: Vec::new(),
            patches: Vec::new(),
            build: BuildOptions::default(),
            strip: true,
            verify: true,
        }
    }

    /// Source archive for `arch`, if the recipe has one
    pub fn source_for(&self, arch: Arch) -> Result<Option<ResolvedSource>, CatalogError> {
        match &self.source {
            None => Ok(None),
            Some(spec) => spec.resolve(&self.name, arch).map(Some),
        }
    }

    /// Parse a single recipe from TOML
    pub fn from_toml(content: &str, origin: &str) -> Result<Self, CatalogError> {
        toml::from_str(content).map_err(|e| CatalogError::Parse {
            origin: origin.to_string(),
            error: e.to_string(),
        })
    }
}

/// Build system driving the configure, build and install steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildSystem {
    /// `./configure && make && make install`
    #[default]
    Autotools,
    /// `cmake && make && make install`
    Cmake,
    /// `python setup.py build && python setup.py install`
    Python,
    /// Plain Makefile, no configure step
    Make,
    /// Archive of RPMs unpacked into the prefix with `rpm2cpio | cpio`
    RpmBundle,
    /// No source and no steps; exists to pull in dependencies
    Meta,
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildSystem::Autotools => "autotools",
            BuildSystem::Cmake => "cmake",
            BuildSystem::Python => "python",
            BuildSystem::Make => "make",
            BuildSystem::RpmBundle => "rpm-bundle",
            BuildSystem::Meta => "meta",
        };
        f.write_str(name)
    }
}

/// Source archive location
///
/// Either a single `url` or per-architecture entries under `arch`; an
/// architecture entry wins over the shared URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    #[serde(default)]
    pub url: Option<String>,

    /// `sha256:<hex>`, `md5:<hex>` or bare hex
    #[serde(default)]
    pub checksum: Option<String>,

    /// Cache file name, defaults to the last URL segment
    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub arch: BTreeMap<Arch, ArchSource>,
}

/// Per-architecture source override
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArchSource {
    pub url: String,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl SourceSpec {
    /// Pick the URL and checksum for `arch`
    pub fn resolve(&self, recipe: &str, arch: Arch) -> Result<ResolvedSource, CatalogError> {
        let (url, checksum) = match self.arch.get(&arch) {
            Some(entry) => (entry.url.clone(), entry.checksum.clone()),
            None => match &self.url {
                Some(url) => (url.clone(), self.checksum.clone()),
                None => {
                    return Err(CatalogError::NoSourceForArch {
                        recipe: recipe.to_string(),
                        arch: arch.to_string(),
                    })
                }
            },
        };

        let checksum = checksum.as_deref().map(str::parse::<Checksum>).transpose()?;
        let file_name = self
            .file_name
            .clone()
            .unwrap_or_else(|| file_name_from_url(&url));

        Ok(ResolvedSource {
            url,
            checksum,
            file_name,
        })
    }
}

/// Source archive resolved for one architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: String,
    pub checksum: Option<Checksum>,
    pub file_name: String,
}

/// Last path segment of a URL, without query or fragment
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("source")
        .to_string()
}

/// Expected digest of a source archive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Checksum {
    Sha256(String),
    Md5(String),
}

impl Checksum {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Checksum::Sha256(_) => "sha256",
            Checksum::Md5(_) => "md5",
        }
    }

    /// Lowercase hex digest
    pub fn hex(&self) -> &str {
        match self {
            Checksum::Sha256(hex) | Checksum::Md5(hex) => hex,
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm(), self.hex())
    }
}

impl FromStr for Checksum {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::InvalidChecksum {
            value: s.to_string(),
        };
        let trimmed = s.trim();
        let (algorithm, hex) = match trimmed.split_once(':') {
            Some((algorithm, hex)) => (Some(algorithm.to_ascii_lowercase()), hex),
            None => (None, trimmed),
        };

        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let hex = hex.to_ascii_lowercase();

        match (algorithm.as_deref(), hex.len()) {
            (Some("sha256") | None, 64) => Ok(Checksum::Sha256(hex)),
            (Some("md5") | None, 32) => Ok(Checksum::Md5(hex)),
            _ => Err(invalid()),
        }
    }
}

/// Build step customization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildOptions {
    /// Replace a variable for this recipe's commands
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Append text to a variable
    #[serde(default)]
    pub append: BTreeMap<String, String>,

    /// Remove individual flag tokens from a variable
    #[serde(default)]
    pub strip_flags: BTreeMap<String, Vec<String>>,

    /// Configure script relative to the source root
    #[serde(default)]
    pub configure_script: Option<String>,

    /// Extra arguments after `--prefix`
    #[serde(default)]
    pub configure_args: Vec<String>,

    /// Pass `CC=...` assignments as configure arguments; when off they are
    /// only exported in the environment
    #[serde(default = "default_true")]
    pub configure_vars: bool,

    /// Extra `-D` arguments for CMake
    #[serde(default)]
    pub cmake_args: Vec<String>,

    /// `NAME=value` arguments on the make command line
    #[serde(default)]
    pub make_vars: BTreeMap<String, String>,

    /// Directory make runs in, relative to the source root
    #[serde(default)]
    pub make_relpath: Option<String>,

    /// Make target of the build step
    #[serde(default)]
    pub make_target: Option<String>,

    /// Make target of the install step
    #[serde(default)]
    pub install_target: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            vars: BTreeMap::new(),
            append: BTreeMap::new(),
            strip_flags: BTreeMap::new(),
            configure_script: None,
            configure_args: Vec::new(),
            configure_vars: true,
            cmake_args: Vec::new(),
            make_vars: BTreeMap::new(),
            make_relpath: None,
            make_target: None,
            install_target: None,
        }
    }
}
