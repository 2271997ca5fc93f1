//! Build session
//!
//! A session owns one environment root: its configuration, target
//! environment, recipe catalog and install manifest. It resolves the
//! requested recipes into a build order and runs them strictly in
//! sequence, skipping recipes already recorded for this configuration and
//! halting at the first failure.

use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::build_env::{BuildEnvironment, EnvMap};
use crate::core::catalog::Catalog;
use crate::core::compat::SymbolConstraint;
use crate::core::config::SessionConfig;
use crate::core::lifecycle::{BuildContext, RecipeBuild, RecipeState};
use crate::core::manifest::{InstallManifest, InstallState};
use crate::core::resolver;
use crate::core::target::resolve_target;
use crate::error::{LsbrootError, ResolverError};
use crate::infra::archive::ToolExtractor;
use crate::infra::dirs::LsbrootDirs;
use crate::infra::download::SourceFetcher;
use crate::infra::process::CommandRunner;

/// Progress notifications emitted while a session builds
#[derive(Debug)]
pub enum SessionEvent<'e> {
    /// Build order computed
    Planned { order: &'e [String] },
    /// Recipe already installed for this configuration
    Skipped { recipe: &'e str },
    /// Recipe about to run; `index` is zero-based
    Started {
        recipe: &'e str,
        index: usize,
        total: usize,
        reason: &'e InstallState,
    },
    /// A lifecycle step completed
    StateChanged {
        recipe: &'e str,
        state: &'e RecipeState,
    },
    /// Recipe recorded
    Finished { recipe: &'e str, files: usize },
}

/// Outcome of a successful build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Full resolved order
    pub order: Vec<String>,
    /// Recipes built in this session
    pub built: Vec<String>,
    /// Recipes skipped as already installed
    pub skipped: Vec<String>,
}

/// Merge the built-in catalog with user recipe directories
///
/// Later sources override earlier ones by recipe name: built-in, then the
/// user config directory, then the environment's own catalog directory.
pub fn load_catalog(
    root: &Path,
    config: &SessionConfig,
    dirs: &LsbrootDirs,
) -> Result<Catalog, LsbrootError> {
    let mut catalog = Catalog::builtin()?;

    let mut extra: Vec<PathBuf> = vec![dirs.user_recipes_dir()];
    extra.extend(config.catalog_dir(root));

    for dir in extra.iter().filter(|d| d.is_dir()) {
        catalog.load_dir(dir)?;
    }
    Ok(catalog)
}

/// One environment root opened for building
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    environment: BuildEnvironment,
    catalog: Catalog,
    manifest: InstallManifest,
    constraints: Vec<SymbolConstraint>,
}

impl Session {
    /// Open `root`, creating its prefix and composing the environment
    pub fn open(
        root: &Path,
        config: SessionConfig,
        catalog: Catalog,
        inherited: EnvMap,
    ) -> Result<Self, LsbrootError> {
        let target = resolve_target(&config.target, config.arch, root.join(defaults::PREFIX_DIR))?;
        let constraints = config.effective_constraints(target.default_constraints())?;
        let environment = BuildEnvironment::initialize(root, target, inherited)?;
        let manifest = InstallManifest::load(&InstallManifest::path_for(root))?;

        tracing::info!(
            "Opened {} environment ({}) at {}",
            environment.target().id(),
            environment.target().arch(),
            root.display()
        );

        Ok(Self {
            config,
            environment,
            catalog,
            manifest,
            constraints,
        })
    }

    pub fn root(&self) -> &Path {
        self.environment.root()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn environment(&self) -> &BuildEnvironment {
        &self.environment
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn manifest(&self) -> &InstallManifest {
        &self.manifest
    }

    /// Symbol-version ceilings enforced in this session
    pub fn constraints(&self) -> &[SymbolConstraint] {
        &self.constraints
    }

    /// Resolve `requested` into a build order, environment recipes first
    pub fn plan(&self, requested: &[String]) -> Result<Vec<String>, ResolverError> {
        let env_deps = self.environment.target().dependencies();
        resolver::resolve(&self.catalog, &env_deps, requested)
    }

    /// Install state of one recipe for this configuration
    pub fn install_state(&self, recipe: &str) -> InstallState {
        let target = self.environment.target();
        self.manifest
            .install_state(recipe, target.id(), target.arch(), self.root())
    }

    /// Build `requested` and everything it needs
    pub fn build(
        &mut self,
        requested: &[String],
        runner: &dyn CommandRunner,
        fetcher: &dyn SourceFetcher,
        observer: &mut dyn FnMut(SessionEvent<'_>),
    ) -> Result<BuildReport, LsbrootError> {
        let order = self.plan(requested)?;
        observer(SessionEvent::Planned { order: &order });

        let extractor = ToolExtractor::new(runner, self.environment.env());
        let ctx = BuildContext {
            environment: &self.environment,
            runner,
            fetcher,
            extractor: &extractor,
            constraints: &self.constraints,
            jobs: self.config.jobs(),
        };

        let mut report = BuildReport {
            order: order.clone(),
            ..BuildReport::default()
        };
        let total = order.len();

        for (index, name) in order.iter().enumerate() {
            let target = ctx.environment.target();
            let state =
                self.manifest
                    .install_state(name, target.id(), target.arch(), ctx.environment.root());

            if state.is_installed() {
                tracing::info!("{name}: already installed, skipping");
                observer(SessionEvent::Skipped { recipe: name });
                report.skipped.push(name.clone());
                continue;
            }
            match &state {
                InstallState::MissingFiles(files) => {
                    tracing::warn!("{name}: {} recorded file(s) missing, rebuilding", files.len());
                }
                InstallState::ConfigMismatch { target, arch } => {
                    tracing::info!("{name}: recorded for {target} {arch}, rebuilding");
                }
                InstallState::NotRecorded | InstallState::Installed => {}
            }
            // A stale entry must not outlive a failed rebuild
            if self.manifest.forget(name).is_some() {
                self.manifest
                    .save(&InstallManifest::path_for(ctx.environment.root()))?;
            }

            let recipe = self
                .catalog
                .get(name)
                .ok_or_else(|| ResolverError::UnknownRecipe {
                    name: name.clone(),
                    required_by: None,
                })?;

            observer(SessionEvent::Started {
                recipe: name,
                index,
                total,
                reason: &state,
            });

            let mut build = RecipeBuild::new(recipe, &ctx);
            build.run_observed(&mut self.manifest, &mut |recipe, state| {
                observer(SessionEvent::StateChanged { recipe, state });
            })?;

            observer(SessionEvent::Finished {
                recipe: name,
                files: build.files().len(),
            });
            report.built.push(name.clone());
        }

        Ok(report)
    }
}
