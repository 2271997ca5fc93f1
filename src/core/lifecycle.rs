//! Recipe lifecycle
//!
//! Drives one recipe through fetch, patch, configure, build, install and
//! record. Every step is re-runnable: extraction always starts from a
//! clean working directory, so an interrupted recipe simply starts over
//! from fetch in the next session.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::build_env::{BuildEnvironment, EnvMap};
use crate::core::compat::SymbolConstraint;
use crate::core::manifest::{InstallManifest, InstalledRecipe};
use crate::core::patch::PatchStage;
use crate::core::recipe::{BuildSystem, RecipeDefinition, ResolvedSource};
use crate::error::{FilesystemError, LsbrootError};
use crate::infra::archive::ArchiveExtractor;
use crate::infra::download::SourceFetcher;
use crate::infra::filesystem::{self, FileSnapshot};
use crate::infra::postprocess::{ArtifactProcessor, PostProcessPolicy};
use crate::infra::process::{CommandOutput, CommandRunner, CommandSpec};

/// One lifecycle step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Fetch,
    Patch,
    Configure,
    Build,
    Install,
    Record,
}

impl Step {
    /// Every step, in execution order
    pub const ALL: [Step; 6] = [
        Step::Fetch,
        Step::Patch,
        Step::Configure,
        Step::Build,
        Step::Install,
        Step::Record,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Patch => "patch",
            Step::Configure => "configure",
            Step::Build => "build",
            Step::Install => "install",
            Step::Record => "record",
        }
    }

    /// State reached when this step succeeds
    pub fn completed_state(self) -> RecipeState {
        match self {
            Step::Fetch => RecipeState::Fetched,
            Step::Patch => RecipeState::Patched,
            Step::Configure => RecipeState::Configured,
            Step::Build => RecipeState::Built,
            Step::Install => RecipeState::Installed,
            Step::Record => RecipeState::Recorded,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeState {
    Uninitialized,
    Fetched,
    Patched,
    Configured,
    Built,
    Installed,
    Recorded,
    /// Terminal; the recipe stays unrecorded
    Failed { step: Step, error: String },
}

impl RecipeState {
    /// Step that moves the recipe out of this state, if any
    pub fn next_step(&self) -> Option<Step> {
        match self {
            RecipeState::Uninitialized => Some(Step::Fetch),
            RecipeState::Fetched => Some(Step::Patch),
            RecipeState::Patched => Some(Step::Configure),
            RecipeState::Configured => Some(Step::Build),
            RecipeState::Built => Some(Step::Install),
            RecipeState::Installed => Some(Step::Record),
            RecipeState::Recorded | RecipeState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_step().is_none()
    }
}

impl fmt::Display for RecipeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeState::Uninitialized => f.write_str("uninitialized"),
            RecipeState::Fetched => f.write_str("fetched"),
            RecipeState::Patched => f.write_str("patched"),
            RecipeState::Configured => f.write_str("configured"),
            RecipeState::Built => f.write_str("built"),
            RecipeState::Installed => f.write_str("installed"),
            RecipeState::Recorded => f.write_str("recorded"),
            RecipeState::Failed { step, .. } => write!(f, "failed during {step}"),
        }
    }
}

/// Collaborators shared by every recipe in a session
pub struct BuildContext<'a> {
    pub environment: &'a BuildEnvironment,
    pub runner: &'a dyn CommandRunner,
    pub fetcher: &'a dyn SourceFetcher,
    pub extractor: &'a dyn ArchiveExtractor,
    /// Symbol-version ceilings for installed artifacts
    pub constraints: &'a [SymbolConstraint],
    /// Parallel make jobs
    pub jobs: usize,
}

/// Variables a recipe's configure step passes as `KEY=value` arguments
const CONFIGURE_VARS: &[&str] = &[
    "CC",
    "CXX",
    "LDFLAGS",
    "CFLAGS",
    "CXXFLAGS",
    "CPPFLAGS",
    "LD_LIBRARY_PATH",
    "PKG_CONFIG_PATH",
];

/// Compose the per-recipe variable overrides
///
/// Starts from the target's compiler selection and search paths, then
/// applies the recipe's `vars`, `append` and `strip_flags` in that order.
/// `CPPFLAGS` mirrors the final `CXXFLAGS` unless the recipe sets it.
pub fn recipe_variables(
    environment: &BuildEnvironment,
    recipe: &RecipeDefinition,
) -> BTreeMap<String, String> {
    let target = environment.target();
    let mut vars: BTreeMap<String, String> = target
        .compiler_flags()
        .to_pairs()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    for (key, value) in environment.recipe_vars() {
        vars.insert(key.clone(), value.clone());
    }
    if let Some(pkg) = environment.env().get("PKG_CONFIG_PATH") {
        vars.insert("PKG_CONFIG_PATH".to_string(), pkg.to_string());
    }

    if recipe.build_system == BuildSystem::Cmake {
        if let Some(extra) = target.cmake_cxxflags() {
            append_flags(&mut vars, "CXXFLAGS", &extra);
        }
    }

    let options = &recipe.build;
    for (key, value) in &options.vars {
        vars.insert(key.clone(), value.clone());
    }
    for (key, value) in &options.append {
        append_flags(&mut vars, key, value);
    }
    for (key, flags) in &options.strip_flags {
        if let Some(current) = vars.get_mut(key) {
            *current = current
                .split_whitespace()
                .filter(|token| !flags.iter().any(|f| f == token))
                .collect::<Vec<_>>()
                .join(" ");
        }
    }

    if !options.vars.contains_key("CPPFLAGS") {
        let cxxflags = vars.get("CXXFLAGS").cloned().unwrap_or_default();
        vars.insert("CPPFLAGS".to_string(), cxxflags);
    }

    vars
}

fn append_flags(vars: &mut BTreeMap<String, String>, key: &str, extra: &str) {
    let entry = vars.entry(key.to_string()).or_default();
    if entry.is_empty() {
        *entry = extra.trim().to_string();
    } else {
        entry.push(' ');
        entry.push_str(extra.trim());
    }
}

/// One recipe moving through its lifecycle
pub struct RecipeBuild<'a> {
    recipe: &'a RecipeDefinition,
    ctx: &'a BuildContext<'a>,
    state: RecipeState,
    vars: BTreeMap<String, String>,
    workdir: PathBuf,
    source: Option<ResolvedSource>,
    source_root: Option<PathBuf>,
    before_install: Option<FileSnapshot>,
    files: Vec<String>,
}

impl<'a> RecipeBuild<'a> {
    pub fn new(recipe: &'a RecipeDefinition, ctx: &'a BuildContext<'a>) -> Self {
        Self {
            recipe,
            ctx,
            state: RecipeState::Uninitialized,
            vars: recipe_variables(ctx.environment, recipe),
            workdir: ctx.environment.workdir(&recipe.name),
            source: None,
            source_root: None,
            before_install: None,
            files: Vec::new(),
        }
    }

    pub fn state(&self) -> &RecipeState {
        &self.state
    }

    pub fn name(&self) -> &str {
        &self.recipe.name
    }

    /// Files recorded for this recipe, relative to the environment root
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Per-recipe variable overrides in effect
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Run the remaining steps until the recipe is recorded or fails
    pub fn run(&mut self, manifest: &mut InstallManifest) -> Result<(), LsbrootError> {
        self.run_observed(manifest, &mut |_, _| {})
    }

    /// Like [`RecipeBuild::run`], reporting every state change
    pub fn run_observed(
        &mut self,
        manifest: &mut InstallManifest,
        observer: &mut dyn FnMut(&str, &RecipeState),
    ) -> Result<(), LsbrootError> {
        loop {
            let advanced = self.advance(manifest);
            match advanced {
                Ok(None) => return Ok(()),
                Ok(Some(_)) => observer(&self.recipe.name, &self.state),
                Err(error) => {
                    observer(&self.recipe.name, &self.state);
                    return Err(error);
                }
            }
        }
    }

    /// Execute the next step
    ///
    /// Returns the step that ran, or `None` once the recipe is in a
    /// terminal state. A failing step moves the recipe to
    /// [`RecipeState::Failed`] and returns the error wrapped with the
    /// recipe name and step.
    pub fn advance(&mut self, manifest: &mut InstallManifest) -> Result<Option<Step>, LsbrootError> {
        let Some(step) = self.state.next_step() else {
            return Ok(None);
        };

        tracing::debug!("{}: starting {step}", self.recipe.name);
        let result = match step {
            Step::Fetch => self.fetch(),
            Step::Patch => self.patch(),
            Step::Configure => self.configure(),
            Step::Build => self.build(),
            Step::Install => self.install(),
            Step::Record => self.record(manifest),
        };

        match result {
            Ok(()) => {
                self.state = step.completed_state();
                tracing::info!("{}: {}", self.recipe.name, self.state);
                Ok(Some(step))
            }
            Err(error) => {
                self.state = RecipeState::Failed {
                    step,
                    error: error.to_string(),
                };
                tracing::warn!("{}: {step} failed", self.recipe.name);
                Err(LsbrootError::RecipeFailed {
                    recipe: self.recipe.name.clone(),
                    step,
                    source: Box::new(error),
                })
            }
        }
    }

    fn prefix(&self) -> &Path {
        self.ctx.environment.prefix()
    }

    /// Directory patches and build commands operate in
    fn source_dir(&self) -> PathBuf {
        self.source_root
            .clone()
            .unwrap_or_else(|| self.workdir.clone())
    }

    /// Run a command with the recipe's variables and log its output
    fn exec(&self, cmd: CommandSpec) -> Result<CommandOutput, LsbrootError> {
        let mut overrides: Vec<(String, String)> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if self.ctx.jobs > 1 {
            overrides.push(("MAKEFLAGS".to_string(), format!("-j{}", self.ctx.jobs)));
        }
        overrides.extend(cmd.env.iter().cloned());
        let cmd = CommandSpec { env: overrides, ..cmd };

        let log = self.ctx.environment.log_path(&self.recipe.name);
        let outcome = self.ctx.runner.run(self.ctx.environment.env(), &cmd);

        let entry = match &outcome {
            Ok(output) => format!("$ {cmd}\n{}\n", output.combined()),
            Err(error) => format!("$ {cmd}\n{error}\n"),
        };
        filesystem::append_file(&log, &entry)?;

        Ok(outcome?)
    }

    fn apply_patches(&self, stage: PatchStage, base: &Path) -> Result<(), LsbrootError> {
        for patch in self.recipe.patches.iter().filter(|p| p.stage == stage) {
            let changed = patch.apply(base)?;
            tracing::debug!(
                "{}: patched {} file(s) matching '{}'",
                self.recipe.name,
                changed.len(),
                patch.file
            );
        }
        Ok(())
    }

    fn fetch(&mut self) -> Result<(), LsbrootError> {
        let Some(source) = self.recipe.source_for(self.ctx.environment.target().arch())? else {
            filesystem::recreate_dir(&self.workdir)?;
            self.source_root = None;
            return Ok(());
        };

        let archive = self.ctx.fetcher.fetch(&source)?;
        let root = self.ctx.extractor.extract(&archive, &self.workdir)?;
        self.source_root = Some(root);
        self.source = Some(source);
        Ok(())
    }

    fn patch(&mut self) -> Result<(), LsbrootError> {
        self.apply_patches(PatchStage::Source, &self.source_dir())
    }

    fn configure(&mut self) -> Result<(), LsbrootError> {
        let dir = self.source_dir();
        let prefix = self.prefix().display().to_string();
        let options = &self.recipe.build;

        match self.recipe.build_system {
            BuildSystem::Autotools => {
                let script = options.configure_script.as_deref().unwrap_or("./configure");
                let mut cmd = CommandSpec::new(script)
                    .arg(format!("--prefix={prefix}"))
                    .args(&options.configure_args)
                    .cwd(&dir);
                if options.configure_vars {
                    for key in CONFIGURE_VARS {
                        let value = self.vars.get(*key).map(String::as_str).unwrap_or_default();
                        cmd = cmd.arg(format!("{key}={value}"));
                    }
                }
                self.exec(cmd)?;
            }
            BuildSystem::Cmake => {
                let cmd = CommandSpec::new("cmake")
                    .arg(format!("-DCMAKE_INSTALL_PREFIX={prefix}"))
                    .args(&options.cmake_args)
                    .arg(".")
                    .cwd(&dir);
                self.exec(cmd)?;
            }
            BuildSystem::Python | BuildSystem::Make | BuildSystem::RpmBundle | BuildSystem::Meta => {}
        }

        self.apply_patches(PatchStage::Configured, &dir)
    }

    fn make_command(&self, target: Option<&str>) -> CommandSpec {
        let options = &self.recipe.build;
        let var = |key: &str| self.vars.get(key).cloned().unwrap_or_default();

        let mut dir = self.source_dir();
        if let Some(rel) = &options.make_relpath {
            dir = dir.join(rel);
        }

        let mut cmd = CommandSpec::new("make")
            .arg(format!("CC={}", var("CC")))
            .arg(format!("CXX={}", var("CXX")))
            .args(options.make_vars.iter().map(|(k, v)| format!("{k}={v}")))
            .arg("-C")
            .path_arg(&dir);
        if let Some(target) = target {
            cmd = cmd.arg(target);
        }
        cmd
    }

    fn python_command(&self, action: &str) -> CommandSpec {
        let python = self.prefix().join("bin").join("python");
        CommandSpec::new(python.display().to_string())
            .arg("setup.py")
            .arg(action)
            .cwd(self.source_dir())
    }

    fn build(&mut self) -> Result<(), LsbrootError> {
        match self.recipe.build_system {
            BuildSystem::Autotools | BuildSystem::Cmake | BuildSystem::Make => {
                let cmd = self.make_command(self.recipe.build.make_target.as_deref());
                self.exec(cmd)?;
            }
            BuildSystem::Python => {
                self.exec(self.python_command("build"))?;
            }
            BuildSystem::RpmBundle | BuildSystem::Meta => {}
        }
        Ok(())
    }

    fn install(&mut self) -> Result<(), LsbrootError> {
        let root = self.ctx.environment.root();
        self.before_install = Some(FileSnapshot::capture(self.prefix(), root)?);

        match self.recipe.build_system {
            BuildSystem::Autotools | BuildSystem::Cmake | BuildSystem::Make => {
                let target = self
                    .recipe
                    .build
                    .install_target
                    .as_deref()
                    .unwrap_or("install");
                self.exec(self.make_command(Some(target)))?;
            }
            BuildSystem::Python => {
                self.exec(self.python_command("install"))?;
            }
            BuildSystem::RpmBundle => self.install_rpms()?,
            BuildSystem::Meta => {}
        }

        self.apply_patches(PatchStage::Installed, self.prefix())
    }

    /// Unpack every RPM of the bundle into the prefix
    fn install_rpms(&self) -> Result<(), LsbrootError> {
        let dir = self.source_dir();
        let pattern = dir.join("*.rpm").display().to_string();
        let mut rpms: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| FilesystemError::ReadFile {
                path: dir.clone(),
                error: e.to_string(),
            })?
            .filter_map(Result::ok)
            .collect();
        rpms.sort();

        if rpms.is_empty() {
            tracing::warn!("{}: no RPM packages in {}", self.recipe.name, dir.display());
        }

        for rpm in rpms {
            let mut cpio = rpm.clone().into_os_string();
            cpio.push(".cpio");
            let cpio = PathBuf::from(cpio);

            self.exec(
                CommandSpec::new("rpm2cpio")
                    .path_arg(&rpm)
                    .stdout_file(&cpio)
                    .cwd(&dir),
            )?;
            self.exec(
                CommandSpec::new("cpio")
                    .arg("-duvi")
                    .stdin_file(&cpio)
                    .cwd(self.prefix()),
            )?;
        }
        Ok(())
    }

    fn record(&mut self, manifest: &mut InstallManifest) -> Result<(), LsbrootError> {
        let environment = self.ctx.environment;
        let root = environment.root();
        let after = FileSnapshot::capture(self.prefix(), root)?;
        let changed = self
            .before_install
            .take()
            .unwrap_or_default()
            .changed_since(&after);

        if self.recipe.verify {
            let policy = PostProcessPolicy {
                strip: self.recipe.strip,
                constraints: self.ctx.constraints.to_vec(),
            };
            let env = self.post_process_env();
            let processor = ArtifactProcessor::new(self.ctx.runner, &env, self.prefix());
            for rel in &changed {
                processor.process(&root.join(rel), &policy)?;
            }
        } else {
            tracing::warn!(
                "{}: binary verification disabled; {} file(s) left untouched",
                self.recipe.name,
                changed.len()
            );
        }

        self.files = changed
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();

        let target = environment.target();
        let entry = InstalledRecipe::completed(
            target.id(),
            target.arch(),
            self.source
                .as_ref()
                .and_then(|s| s.checksum.as_ref())
                .map(ToString::to_string),
            self.files.clone(),
        );
        manifest.record(&self.recipe.name, entry);
        manifest.save(&InstallManifest::path_for(root))?;
        Ok(())
    }

    /// Session environment with the recipe-only variables applied
    fn post_process_env(&self) -> EnvMap {
        self.ctx
            .environment
            .env()
            .merged(self.ctx.environment.recipe_vars())
    }
}
