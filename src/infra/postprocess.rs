//! Binary post-processing
//!
//! Every ELF executable and shared library a recipe installs is checked
//! against the symbol-version ceilings, stripped, and given a relative
//! runtime search path so the prefix can be moved as a whole.

use std::path::Path;

use crate::core::build_env::EnvMap;
use crate::core::compat::{self, SymbolConstraint};
use crate::error::{CommandError, LsbrootError, VerifyError};
use crate::infra::filesystem;
use crate::infra::process::{CommandRunner, CommandSpec};

/// ELF magic bytes
const ELF_MAGIC: &[u8] = &[0x7f, b'E', b'L', b'F'];

/// Owner read, write and execute
const STRIP_MODE: u32 = 0o700;

/// objdump's complaint about an object without a dynamic symbol table
const NOT_DYNAMIC: &str = "not a dynamic object";

/// Kind of a post-processable artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    SharedLibrary,
    Executable,
}

/// Check if a file starts with the ELF magic
pub fn is_elf_binary(path: &Path) -> bool {
    use std::io::Read;

    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).is_ok() && magic == ELF_MAGIC
}

#[cfg(unix)]
fn has_exec_bit(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_meta: &std::fs::Metadata) -> bool {
    false
}

/// Whether `path` is reached through a symlink somewhere below `prefix`
fn reached_through_symlink(prefix: &Path, path: &Path) -> bool {
    let (Ok(real_prefix), Ok(real_path)) = (prefix.canonicalize(), path.canonicalize()) else {
        return true;
    };
    match (path.strip_prefix(prefix), real_path.strip_prefix(&real_prefix)) {
        (Ok(logical), Ok(physical)) => logical != physical,
        _ => true,
    }
}

/// Decide whether an installed file gets post-processed
///
/// Symlinks, files reached through symlinks, and anything that is not an
/// ELF object (such as linker scripts named `libc.so`) are skipped.
pub fn classify(prefix: &Path, path: &Path) -> Option<ArtifactKind> {
    let meta = path.symlink_metadata().ok()?;
    if !meta.file_type().is_file() || reached_through_symlink(prefix, path) {
        return None;
    }

    let name = path.file_name()?.to_string_lossy();
    let kind = if compat::is_shared_library_name(&name) {
        ArtifactKind::SharedLibrary
    } else if !name.contains('.') || has_exec_bit(&meta) {
        ArtifactKind::Executable
    } else {
        return None;
    };

    is_elf_binary(path).then_some(kind)
}

/// Dump the dynamic symbol table of `path` and reject versions above the
/// ceilings
pub fn check_symbols(
    runner: &dyn CommandRunner,
    env: &EnvMap,
    path: &Path,
    constraints: &[SymbolConstraint],
) -> Result<(), LsbrootError> {
    if constraints.is_empty() {
        return Ok(());
    }

    tracing::info!("Verifying symbols of {}", path.display());
    let cmd = CommandSpec::new("objdump")
        .arg("-T")
        .path_arg(path)
        .allow_failure();
    let output = runner.run(env, &cmd)?;
    if !output.success {
        if output.stderr.contains(NOT_DYNAMIC) {
            tracing::debug!("{} is statically linked; no symbols to verify", path.display());
            return Ok(());
        }
        return Err(CommandError::Failed {
            command: cmd.to_string(),
            status: output
                .code
                .map_or_else(|| "killed by signal".to_string(), |c| format!("exit status: {c}")),
            output: output.combined(),
        }
        .into());
    }

    let lines = compat::incompatible_symbol_lines(&output.stdout, constraints);
    if lines.is_empty() {
        Ok(())
    } else {
        Err(VerifyError::IncompatibleSymbols {
            path: path.to_path_buf(),
            lines,
        }
        .into())
    }
}

/// What happens to each artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessPolicy {
    pub strip: bool,
    pub constraints: Vec<SymbolConstraint>,
}

/// Applies the post-processing pipeline to artifacts inside one prefix
pub struct ArtifactProcessor<'a> {
    runner: &'a dyn CommandRunner,
    env: &'a EnvMap,
    prefix: &'a Path,
}

impl<'a> ArtifactProcessor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, env: &'a EnvMap, prefix: &'a Path) -> Self {
        Self {
            runner,
            env,
            prefix,
        }
    }

    /// Strip symbols, restoring the original mode afterwards
    ///
    /// The mode is restored even when `strip` fails.
    pub fn strip(&self, path: &Path) -> Result<(), LsbrootError> {
        let original = filesystem::file_mode(path)?;
        filesystem::set_file_mode(path, STRIP_MODE)?;

        let result = self
            .runner
            .run(self.env, &CommandSpec::new("strip").path_arg(path));

        filesystem::set_file_mode(path, original)?;
        result?;
        Ok(())
    }

    /// Patchelf inside the prefix, once it has been installed
    pub fn patchelf(&self) -> Option<std::path::PathBuf> {
        let path = self.prefix.join("bin").join("patchelf");
        path.exists().then_some(path)
    }

    /// Rewrite the runtime search path relative to the artifact
    ///
    /// Returns `false` when patchelf is not installed yet or the artifact
    /// lies outside the prefix.
    pub fn adjust_rpath(&self, path: &Path) -> Result<bool, LsbrootError> {
        let Some(patchelf) = self.patchelf() else {
            tracing::debug!("patchelf not installed yet; leaving rpath of {}", path.display());
            return Ok(false);
        };
        let Some(rpath) = compat::relative_rpath(self.prefix, path) else {
            tracing::warn!("{} is outside the prefix; rpath left unchanged", path.display());
            return Ok(false);
        };

        tracing::info!("Adjusting rpath of {}", path.display());
        let cmd = CommandSpec::new(patchelf.display().to_string())
            .arg("--set-rpath")
            .arg(rpath)
            .path_arg(path);
        self.runner.run(self.env, &cmd)?;
        Ok(true)
    }

    /// Run one installed file through the pipeline
    ///
    /// Returns the artifact kind, or `None` when the file was skipped.
    pub fn process(
        &self,
        path: &Path,
        policy: &PostProcessPolicy,
    ) -> Result<Option<ArtifactKind>, LsbrootError> {
        let Some(kind) = classify(self.prefix, path) else {
            return Ok(None);
        };

        check_symbols(self.runner, self.env, path, &policy.constraints)?;
        if policy.strip {
            self.strip(path)?;
        }
        self.adjust_rpath(path)?;
        Ok(Some(kind))
    }
}
