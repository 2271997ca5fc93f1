//! Binary compatibility rules
//!
//! Pure logic behind the post-build checks: symbol-version ceilings parsed
//! out of a dynamic symbol table dump, and the self-relative runtime search
//! path every installed artifact gets. The commands that produce the dump
//! and apply the rewrite live in [`crate::infra::postprocess`].

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::config::defaults;
use crate::error::VerifyError;

/// Dotted numeric version, compared component-wise
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolVersion(Vec<u32>);

impl SymbolVersion {
    pub fn new(parts: Vec<u32>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }
}

impl PartialOrd for SymbolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SymbolVersion {
    // Lexicographic, so 2.3.4 < 2.4 and 2.4 < 2.4.1
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl FromStr for SymbolVersion {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('.')
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VerifyError::InvalidConstraint {
                value: s.to_string(),
                reason: e.to_string(),
            })?;
        if parts.is_empty() {
            return Err(VerifyError::InvalidConstraint {
                value: s.to_string(),
                reason: "empty version".to_string(),
            });
        }
        Ok(Self(parts))
    }
}

impl fmt::Display for SymbolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&text.join("."))
    }
}

/// Maximum allowed version for one symbol-version namespace (inclusive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolConstraint {
    pub namespace: String,
    pub max: SymbolVersion,
}

impl SymbolConstraint {
    pub fn new(namespace: &str, max: SymbolVersion) -> Self {
        Self {
            namespace: namespace.to_string(),
            max,
        }
    }

    /// Parse a `(namespace, "x.y.z")` pair as found in `lsbroot.toml`
    pub fn parse(namespace: &str, max: &str) -> Result<Self, VerifyError> {
        Ok(Self::new(namespace, max.parse()?))
    }

    /// C runtime and C++ runtime ceilings of the compatibility baseline
    pub fn defaults() -> Vec<Self> {
        defaults::SYMBOL_CEILINGS
            .iter()
            .map(|(namespace, parts)| Self::new(namespace, SymbolVersion::new(parts.to_vec())))
            .collect()
    }

    /// Whether `version` is above this ceiling
    pub fn is_exceeded_by(&self, version: &SymbolVersion) -> bool {
        version > &self.max
    }
}

fn version_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // NAMESPACE_1.2.3, optionally wrapped in parentheses (hidden versions)
        Regex::new(r"^\(?([A-Za-z][A-Za-z0-9]*)_([0-9]+(?:\.[0-9]+)*)\)?$")
            .expect("version tag pattern is a valid regex")
    })
}

/// Split a symbol-table field into its namespace and numeric version
///
/// Returns `None` for fields that are not version tags, including
/// non-numeric tags such as `GLIBC_PRIVATE`.
pub fn parse_version_tag(field: &str) -> Option<(&str, SymbolVersion)> {
    let caps = version_tag_regex().captures(field)?;
    let namespace = caps.get(1)?.as_str();
    let version = caps.get(2)?.as_str().parse().ok()?;
    Some((namespace, version))
}

/// Collect every symbol-table line that references a version above its
/// namespace's ceiling. Lines are returned trimmed, in dump order.
pub fn incompatible_symbol_lines(dump: &str, constraints: &[SymbolConstraint]) -> Vec<String> {
    dump.lines()
        .filter(|line| {
            line.split_whitespace().any(|field| {
                parse_version_tag(field).is_some_and(|(namespace, version)| {
                    constraints
                        .iter()
                        .any(|c| c.namespace == namespace && c.is_exceeded_by(&version))
                })
            })
        })
        .map(|line| line.trim().to_string())
        .collect()
}

/// Number of directory levels between an artifact's directory and the prefix
pub fn depth_below_prefix(prefix: &Path, artifact: &Path) -> Option<usize> {
    let dir = artifact.parent()?;
    let rel = dir.strip_prefix(prefix).ok()?;
    let mut depth = 0usize;
    for component in rel.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(depth)
}

/// Self-relative runtime search path for an artifact inside the prefix
///
/// The artifact's own directory comes first, then the prefix's `lib`
/// directory reached through one `..` per level. `None` when the artifact
/// is not below the prefix.
pub fn relative_rpath(prefix: &Path, artifact: &Path) -> Option<String> {
    let depth = depth_below_prefix(prefix, artifact)?;
    let backrefs = "../".repeat(depth);
    Some(format!(
        "{origin}:{origin}/{backrefs}{lib}",
        origin = defaults::ORIGIN_TOKEN,
        lib = defaults::PREFIX_LIB_DIR
    ))
}

/// Shared-library naming: `libfoo.so` or `libfoo.so.1.2`
pub fn is_shared_library_name(name: &str) -> bool {
    name.ends_with(".so") || name.contains(".so.")
}
