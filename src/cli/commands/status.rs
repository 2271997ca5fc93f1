//! CLI implementation for `lsbroot status`
//!
//! Lists recorded recipes and whether each is still installed for the
//! environment's configuration.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::commands::load_config;
use crate::cli::output::{is_json, is_quiet, print_detail, print_info, print_json, status};
use crate::config::defaults;
use crate::core::manifest::{InstallManifest, InstallState};
use crate::core::session::load_catalog;
use crate::infra::dirs::LsbrootDirs;

fn describe(state: &InstallState) -> String {
    match state {
        InstallState::Installed => "installed".to_string(),
        InstallState::NotRecorded => "not installed".to_string(),
        InstallState::ConfigMismatch { target, arch } => {
            format!("built for {target} {arch}, will rebuild")
        }
        InstallState::MissingFiles(files) => {
            format!("{} file(s) missing, will rebuild", files.len())
        }
    }
}

/// Execute the status command
pub fn execute(root: &Path, all: bool) -> Result<()> {
    let config = load_config(root)?;
    let manifest = InstallManifest::load(&InstallManifest::path_for(root))
        .context("Failed to load install manifest")?;

    let mut names: Vec<String> = manifest.recipes.keys().cloned().collect();
    if all {
        let catalog = load_catalog(root, &config, &LsbrootDirs::new())
            .context("Failed to load recipe catalog")?;
        names.extend(catalog.names().map(ToString::to_string));
        names.sort();
        names.dedup();
    }

    let target = config.target.as_str();
    let entries: Vec<(String, InstallState)> = names
        .into_iter()
        .map(|name| {
            let state = manifest.install_state(&name, target, config.arch, root);
            (name, state)
        })
        .collect();

    if is_json() {
        let recipes: Vec<_> = entries
            .iter()
            .map(|(name, state)| {
                let entry = manifest.get(name);
                serde_json::json!({
                    "name": name,
                    "installed": state.is_installed(),
                    "state": describe(state),
                    "files": entry.map_or(0, |e| e.files.len()),
                    "recorded_at": entry.map(|e| e.recorded_at),
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "target": target,
            "arch": config.arch.as_str(),
            "manifest": root.join(defaults::STATE_DIR).join(defaults::MANIFEST_FILE).display().to_string(),
            "recipes": recipes,
        }));
        return Ok(());
    }

    if is_quiet() {
        return Ok(());
    }

    print_info(&format!("{target} environment ({}) at {}", config.arch, root.display()));
    if entries.is_empty() {
        print_detail("No recipes installed yet");
        return Ok(());
    }
    for (name, state) in &entries {
        let mark = if state.is_installed() {
            status::SUCCESS
        } else {
            status::WARNING
        };
        println!("  {mark} {name}: {}", describe(state));
    }
    Ok(())
}
