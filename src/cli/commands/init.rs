//! CLI implementation for `lsbroot init`
//!
//! Writes `lsbroot.toml` and creates the install prefix.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::cli::output::{is_json, print_detail, print_json, print_success};
use crate::config::defaults;
use crate::core::build_env::{BuildEnvironment, EnvMap};
use crate::core::config::SessionConfig;
use crate::core::target::{resolve_target, Arch};

/// Options for `lsbroot init`
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub arch: Option<Arch>,
    pub target: String,
    pub catalog_dir: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub force: bool,
}

/// Execute the init command
pub fn execute(root: &Path, options: &InitOptions) -> Result<()> {
    let config_path = SessionConfig::path_for(root);
    if config_path.exists() && !options.force {
        bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    let config = SessionConfig {
        target: options.target.clone(),
        arch: options.arch.unwrap_or_else(Arch::host),
        catalog_dir: options.catalog_dir.clone(),
        jobs: options.jobs,
        ..SessionConfig::default()
    };

    let target = resolve_target(&config.target, config.arch, root.join(defaults::PREFIX_DIR))?;
    let dependencies = target.dependencies();
    let environment = BuildEnvironment::initialize(root, target, EnvMap::new())
        .with_context(|| format!("Failed to create prefix under {}", root.display()))?;

    config
        .save(root)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "root": root.display().to_string(),
            "prefix": environment.prefix().display().to_string(),
            "target": config.target,
            "arch": config.arch.as_str(),
            "environment_recipes": dependencies,
        }));
        return Ok(());
    }

    print_success(&format!(
        "Initialized {} environment ({}) in {}",
        config.target,
        config.arch,
        root.display()
    ));
    print_detail(&format!("Created {}", defaults::CONFIG_FILE));
    print_detail(&format!("Prefix: {}", environment.prefix().display()));
    if !dependencies.is_empty() {
        print_detail(&format!(
            "Environment recipes built first: {}",
            dependencies.join(", ")
        ));
    }

    Ok(())
}
