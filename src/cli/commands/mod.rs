//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod doctor;
pub mod init;
pub mod order;
pub mod status;
pub mod verify;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::core::config::SessionConfig;
use crate::core::target::Arch;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new environment root
    Init {
        /// Environment root directory
        root: PathBuf,

        /// Architecture (32bit or 64bit); defaults to the host
        #[arg(short, long)]
        arch: Option<Arch>,

        /// Target identifier
        #[arg(short, long, default_value = "linux")]
        target: String,

        /// Directory of user recipe files, relative to the root
        #[arg(long)]
        catalog_dir: Option<PathBuf>,

        /// Number of parallel make jobs
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Overwrite an existing lsbroot.toml
        #[arg(short, long)]
        force: bool,
    },

    /// Build recipes and their dependencies into the environment
    Build {
        /// Environment root directory
        root: PathBuf,

        /// Recipes to build (only the environment's own recipes if empty)
        recipes: Vec<String>,

        /// Number of parallel make jobs
        #[arg(short, long, env = "LSBROOT_JOBS")]
        jobs: Option<usize>,
    },

    /// Print the build order without building
    Order {
        /// Environment root directory
        root: PathBuf,

        /// Recipes to resolve
        recipes: Vec<String>,
    },

    /// Show which recipes are installed
    Status {
        /// Environment root directory
        root: PathBuf,

        /// Also list catalog recipes that are not installed
        #[arg(short, long)]
        all: bool,
    },

    /// Check a binary against the symbol-version ceilings
    Verify {
        /// ELF executable or shared library
        file: PathBuf,

        /// Highest allowed GLIBC symbol version [default: baseline ceiling]
        #[arg(long)]
        glibc: Option<String>,

        /// Highest allowed GLIBCXX symbol version [default: baseline ceiling]
        #[arg(long)]
        glibcxx: Option<String>,
    },

    /// Check host tools and environment configuration
    Doctor {
        /// Environment root to validate as well
        root: Option<PathBuf>,
    },
}

impl Commands {
    /// Execute the command
    pub fn run(self) -> Result<()> {
        match self {
            Self::Init {
                root,
                arch,
                target,
                catalog_dir,
                jobs,
                force,
            } => {
                let options = init::InitOptions {
                    arch,
                    target,
                    catalog_dir,
                    jobs,
                    force,
                };
                init::execute(&root, &options)
            }
            Self::Build {
                root,
                recipes,
                jobs,
            } => build::execute(&root, &recipes, jobs),
            Self::Order { root, recipes } => order::execute(&root, &recipes),
            Self::Status { root, all } => status::execute(&root, all),
            Self::Verify {
                file,
                glibc,
                glibcxx,
            } => verify::execute(&file, glibc.as_deref(), glibcxx.as_deref()),
            Self::Doctor { root } => doctor::execute(root.as_deref()),
        }
    }
}

/// Load the configuration of an initialized environment root
pub(crate) fn load_config(root: &Path) -> Result<SessionConfig> {
    let path = SessionConfig::path_for(root);
    if !path.exists() {
        bail!(
            "No lsbroot.toml found in {}. Run 'lsbroot init {}' first.",
            root.display(),
            root.display()
        );
    }
    SessionConfig::load(root).with_context(|| format!("Failed to load {}", path.display()))
}
