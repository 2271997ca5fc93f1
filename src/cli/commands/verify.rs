//! CLI implementation for `lsbroot verify`
//!
//! Checks one binary against the symbol-version ceilings without building
//! anything.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, print_json, print_success};
use crate::core::build_env::EnvMap;
use crate::core::compat::SymbolConstraint;
use crate::error::{LsbrootError, VerifyError};
use crate::infra::postprocess::{check_symbols, is_elf_binary};
use crate::infra::process::ProcessRunner;

/// Baseline ceilings with the command-line overrides applied
fn ceilings(glibc: Option<&str>, glibcxx: Option<&str>) -> Result<Vec<SymbolConstraint>> {
    let mut constraints = SymbolConstraint::defaults();
    for (namespace, value) in [("GLIBC", glibc), ("GLIBCXX", glibcxx)] {
        let Some(value) = value else { continue };
        let parsed = SymbolConstraint::parse(namespace, value)?;
        match constraints.iter_mut().find(|c| c.namespace == namespace) {
            Some(existing) => *existing = parsed,
            None => constraints.push(parsed),
        }
    }
    Ok(constraints)
}

/// Execute the verify command
pub fn execute(file: &Path, glibc: Option<&str>, glibcxx: Option<&str>) -> Result<()> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }
    if !is_elf_binary(file) {
        bail!("{} is not an ELF binary", file.display());
    }

    let constraints = ceilings(glibc, glibcxx)?;
    let result = check_symbols(&ProcessRunner::new(), &EnvMap::from_process(), file, &constraints);

    if is_json() {
        let offending = match &result {
            Err(LsbrootError::Verify(VerifyError::IncompatibleSymbols { lines, .. })) => lines.clone(),
            _ => Vec::new(),
        };
        print_json(&serde_json::json!({
            "file": file.display().to_string(),
            "compatible": result.is_ok(),
            "incompatible_symbols": offending,
        }));
    }

    result.with_context(|| format!("{} failed verification", file.display()))?;

    if !is_json() {
        let limits: Vec<String> = constraints
            .iter()
            .map(|c| format!("{} <= {}", c.namespace, c.max))
            .collect();
        print_success(&format!("{} only uses {}", file.display(), limits.join(" and ")));
    }
    Ok(())
}
