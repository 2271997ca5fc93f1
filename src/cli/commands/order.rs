//! CLI implementation for `lsbroot order`
//!
//! Prints the resolved build order without touching the environment.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::commands::load_config;
use crate::cli::output::{is_json, is_quiet, print_json};
use crate::config::defaults;
use crate::core::resolver;
use crate::core::session::load_catalog;
use crate::core::target::resolve_target;
use crate::infra::dirs::LsbrootDirs;

/// Execute the order command
pub fn execute(root: &Path, recipes: &[String]) -> Result<()> {
    let config = load_config(root)?;
    let catalog = load_catalog(root, &config, &LsbrootDirs::new())
        .context("Failed to load recipe catalog")?;
    let target = resolve_target(&config.target, config.arch, root.join(defaults::PREFIX_DIR))?;

    let order = resolver::resolve(&catalog, &target.dependencies(), recipes)
        .context("Failed to resolve build order")?;

    if is_json() {
        print_json(&serde_json::json!({ "order": order }));
    } else if !is_quiet() {
        for (index, name) in order.iter().enumerate() {
            println!("{:>3}. {name}", index + 1);
        }
    }
    Ok(())
}
