//! Build command implementation
//!
//! Implements `lsbroot build` to build recipes into an environment root.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;

use crate::cli::commands::load_config;
use crate::cli::output::{
    create_build_bar, create_spinner, is_json, print_detail, print_json, print_success,
};
use crate::core::build_env::EnvMap;
use crate::core::session::{load_catalog, Session, SessionEvent};
use crate::infra::dirs::LsbrootDirs;
use crate::infra::download::HttpFetcher;
use crate::infra::process::ProcessRunner;

/// Execute the build command
pub fn execute(root: &Path, recipes: &[String], jobs: Option<usize>) -> Result<()> {
    let mut config = load_config(root)?;
    if jobs.is_some() {
        config.jobs = jobs;
    }

    let dirs = LsbrootDirs::new();
    let catalog = load_catalog(root, &config, &dirs).context("Failed to load recipe catalog")?;
    let fetcher = HttpFetcher::new(config.download_dir(root, &dirs))
        .context("Failed to set up the download cache")?;

    let spinner = create_spinner("Preparing environment...");
    let opened = Session::open(root, config, catalog, EnvMap::from_process());
    spinner.finish_and_clear();
    let mut session =
        opened.with_context(|| format!("Failed to open environment {}", root.display()))?;

    tracing::info!("Building with {} make job(s)", session.config().jobs());

    let started = Instant::now();
    let bar = create_build_bar(0);
    let runner = ProcessRunner::new();

    let result = session.build(recipes, &runner, &fetcher, &mut |event| match event {
        SessionEvent::Planned { order } => {
            bar.set_length(order.len() as u64);
        }
        SessionEvent::Skipped { recipe } => {
            bar.set_message(format!("{recipe} installed"));
            bar.inc(1);
        }
        SessionEvent::Started { recipe, .. } => {
            bar.set_message(recipe.to_string());
        }
        SessionEvent::StateChanged { recipe, state } => {
            bar.set_message(format!("{recipe}: {state}"));
        }
        SessionEvent::Finished { recipe, files } => {
            bar.println(format!("  built {recipe} ({files} files)"));
            bar.inc(1);
        }
    });
    bar.finish_and_clear();

    let report = result.with_context(|| {
        format!(
            "Build failed; command logs are in {}",
            root.join("build").join("logs").display()
        )
    })?;

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "order": report.order,
            "built": report.built,
            "skipped": report.skipped,
            "elapsed_secs": started.elapsed().as_secs(),
        }));
        return Ok(());
    }

    print_success("Build complete!");
    print_detail(&format!("Recipes built: {}", report.built.len()));
    print_detail(&format!("Already installed: {}", report.skipped.len()));
    print_detail(&format!("Elapsed: {:.1}s", started.elapsed().as_secs_f64()));

    Ok(())
}
