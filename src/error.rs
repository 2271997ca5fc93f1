//! Error types for lsbroot
//!
//! Domain-specific error types using thiserror. Every error aborts the
//! current recipe and the whole session; nothing here is retried.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::lifecycle::Step;

/// Dependency resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Circular dependency detected
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// A requested recipe or a dependency has no catalog entry
    #[error("Unknown recipe '{name}'{}", required_by_suffix(.required_by.as_deref()))]
    UnknownRecipe {
        name: String,
        required_by: Option<String>,
    },
}

fn required_by_suffix(required_by: Option<&str>) -> String {
    required_by
        .map(|parent| format!(" (required by '{parent}')"))
        .unwrap_or_default()
}

/// External command errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command exited unsuccessfully
    #[error("Command `{command}` failed ({status})\n{output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },

    /// Command could not be started
    #[error("Failed to spawn `{command}`: {error}")]
    Spawn { command: String, error: String },

    /// Empty argument vector
    #[error("Refusing to run an empty command line")]
    EmptyCommand,

    /// Redirection file could not be opened
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Source acquisition errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Checksum verification failed
    #[error("Checksum mismatch for '{file}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// Archive extraction failed
    #[error("Failed to extract '{archive}': {error}")]
    ExtractFailed { archive: PathBuf, error: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Line-rewriting patch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Expected pattern was not found in the file being patched
    #[error("Pattern {pattern} not found in '{file}'")]
    PatternNotFound { file: String, pattern: String },

    /// Glob matched no files
    #[error("No files match '{pattern}'")]
    NoMatchingFiles { pattern: String },

    /// Invalid glob expression
    #[error("Invalid file pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },

    /// Patched text no longer fits the file's single-byte encoding
    #[error("Patched text for '{path}' has characters outside Latin-1")]
    Unencodable { path: PathBuf },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Binary compatibility errors
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Artifact references symbol versions above the baseline
    #[error(
        "'{path}' requires a newer system runtime than allowed:\n{}",
        .lines.join("\n")
    )]
    IncompatibleSymbols { path: PathBuf, lines: Vec<String> },

    /// Constraint could not be parsed
    #[error("Invalid symbol constraint '{value}': {reason}")]
    InvalidConstraint { value: String, reason: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Install manifest errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Failed to read manifest
    #[error("Failed to read manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse manifest
    #[error("Failed to parse manifest '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Failed to write manifest
    #[error("Failed to write manifest '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Recipe catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Failed to read a recipe file
    #[error("Failed to read recipe file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse a recipe definition
    #[error("Failed to parse recipe definition '{origin}': {error}")]
    Parse { origin: String, error: String },

    /// Recipe has no source for this architecture
    #[error("Recipe '{recipe}' has no source for architecture {arch}")]
    NoSourceForArch { recipe: String, arch: String },

    /// Checksum string could not be parsed
    #[error("Invalid checksum '{value}': expected sha256:<hex>, md5:<hex> or bare hex")]
    InvalidChecksum { value: String },
}

/// Session configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Failed to write config file
    #[error("Failed to write config file '{path}': {error}")]
    Write { path: PathBuf, error: String },

    /// Unknown target identifier
    #[error("Unknown target '{name}'. Supported targets: {}", .supported.join(", "))]
    UnknownTarget {
        name: String,
        supported: Vec<String>,
    },

    /// Invalid architecture selector
    #[error("Invalid architecture '{value}': expected 32bit or 64bit")]
    InvalidArch { value: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to change permissions
    #[error("Failed to change permissions of '{path}': {error}")]
    Permissions { path: PathBuf, error: String },
}

/// Top-level lsbroot error type
#[derive(Error, Debug)]
pub enum LsbrootError {
    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Command error
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Fetch error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Patch error
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    /// Verification error
    #[error("Compatibility error: {0}")]
    Verify(#[from] VerifyError),

    /// Manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// A lifecycle step failed; the recipe is left unrecorded
    #[error("Recipe '{recipe}' failed during {step}: {source}")]
    RecipeFailed {
        recipe: String,
        step: Step,
        source: Box<LsbrootError>,
    },
}

impl LsbrootError {
    /// The innermost error, unwrapping recipe failure context
    pub fn root_cause(&self) -> &LsbrootError {
        match self {
            Self::RecipeFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_participants() {
        let err = ResolverError::DependencyCycle {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_unknown_recipe_message() {
        let err = ResolverError::UnknownRecipe {
            name: "lib_tiff".to_string(),
            required_by: Some("lib_gtk".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Unknown recipe 'lib_tiff' (required by 'lib_gtk')"
        );

        let err = ResolverError::UnknownRecipe {
            name: "nope".to_string(),
            required_by: None,
        };
        assert_eq!(err.to_string(), "Unknown recipe 'nope'");
    }

    #[test]
    fn test_incompatible_symbols_lists_every_line() {
        let err = VerifyError::IncompatibleSymbols {
            path: PathBuf::from("/env/local/lib/libfoo.so"),
            lines: vec!["line one".to_string(), "line two".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("line one"));
        assert!(message.contains("line two"));
    }

    #[test]
    fn test_root_cause_unwraps_recipe_context() {
        let inner = LsbrootError::Patch(PatchError::NoMatchingFiles {
            pattern: "*.in".to_string(),
        });
        let err = LsbrootError::RecipeFailed {
            recipe: "lib_gtk".to_string(),
            step: Step::Patch,
            source: Box::new(inner),
        };
        assert!(matches!(err.root_cause(), LsbrootError::Patch(_)));
        assert!(err.to_string().contains("lib_gtk"));
        assert!(err.to_string().contains("patch"));
    }
}
