//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

use lsbroot::core::build_env::EnvMap;
use lsbroot::core::recipe::ResolvedSource;
use lsbroot::error::{CommandError, FetchError};
use lsbroot::infra::download::SourceFetcher;
use lsbroot::infra::process::{CommandOutput, CommandRunner, CommandSpec};

/// Test project context
///
/// Creates a temporary directory used as an environment root and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the environment root
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new environment root in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the environment root
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Install prefix of the environment
    pub fn prefix(&self) -> PathBuf {
        self.dir.path().join("local")
    }

    /// Create a file relative to the root
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists relative to the root
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file relative to the root
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run the lsbroot binary with `args`, isolated from the user's dirs
    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_lsbroot"));
        cmd.current_dir(self.dir.path())
            .env("LSBROOT_CACHE_DIR", self.dir.path().join(".cache"))
            .env("LSBROOT_CONFIG_DIR", self.dir.path().join(".config"))
            .env_remove("RUST_LOG");
        for arg in args {
            cmd.arg(arg);
        }
        cmd.output().expect("Failed to execute lsbroot")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// User catalog replacing the host target's `patchelf` with a plain-make
/// recipe and adding a small dependency chain on top of it
pub const SAMPLE_RECIPES: &[(&str, &str)] = &[
    (
        "patchelf.toml",
        r#"
name = "patchelf"
build_system = "make"

[source]
url = "http://example.org/patchelf-0.6.tar.bz2"
"#,
    ),
    (
        "lib_zlib.toml",
        r#"
name = "lib_zlib"
build_system = "make"

[source]
url = "http://example.org/zlib-1.2.5.tar.gz"
"#,
    ),
    (
        "lib_png.toml",
        r#"
name = "lib_png"
build_system = "make"
dependencies = ["lib_zlib"]

[source]
url = "http://example.org/libpng-1.2.44.tar.gz"
"#,
    ),
    (
        "app.toml",
        r#"
name = "app"
build_system = "make"
dependencies = ["lib_png"]
runtime_dependencies = ["lib_fonts"]

[source]
url = "http://example.org/app-1.0.tar.gz"
"#,
    ),
    (
        "lib_fonts.toml",
        r#"
name = "lib_fonts"
build_system = "meta"
"#,
    ),
];

/// Write [`SAMPLE_RECIPES`] into `<root>/recipes`
pub fn write_sample_catalog(project: &TestProject) {
    for (file, content) in SAMPLE_RECIPES {
        project.create_file(&format!("recipes/{file}"), content);
    }
}

/// Command runner that records every argv and fakes the filesystem
/// effects of `tar` and `make install`
///
/// `objdump` answers with the dump registered for the inspected file, or
/// an empty table.
pub struct FakeRunner {
    prefix: PathBuf,
    fail_on: Option<(String, String)>,
    /// (source dir name, path below the prefix) of ELF files `make install` writes
    elf_outputs: Vec<(String, String)>,
    /// (file name, objdump -T output)
    symbols: Vec<(String, String)>,
    calls: RefCell<Vec<Vec<String>>>,
}

/// Bytes that pass the ELF magic check
pub const FAKE_ELF: &[u8] = b"\x7fELF\x01\x01\x01\x00fake object";

impl FakeRunner {
    pub fn new(prefix: &Path) -> Self {
        Self {
            prefix: prefix.to_path_buf(),
            fail_on: None,
            elf_outputs: Vec::new(),
            symbols: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Fail runs of `program` whose argv contains `needle`
    pub fn failing_on(mut self, program: &str, needle: &str) -> Self {
        self.fail_on = Some((program.to_string(), needle.to_string()));
        self
    }

    /// Make `make install` in `source_dir` also write an ELF file at
    /// `rel` below the prefix
    pub fn installing_elf(mut self, source_dir: &str, rel: &str) -> Self {
        self.elf_outputs.push((source_dir.to_string(), rel.to_string()));
        self
    }

    /// Dynamic symbol table reported for files named `file_name`
    pub fn with_symbols(mut self, file_name: &str, dump: &str) -> Self {
        self.symbols.push((file_name.to_string(), dump.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Programs run, in order
    pub fn programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|argv| argv[0].clone()).collect()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

fn arg_after<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
    argv.iter()
        .position(|a| a == flag)
        .and_then(|i| argv.get(i + 1))
        .map(String::as_str)
}

impl CommandRunner for FakeRunner {
    fn run(&self, _env: &EnvMap, cmd: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.borrow_mut().push(cmd.argv.clone());

        if let Some((program, needle)) = &self.fail_on {
            if cmd.argv[0] == *program && cmd.argv.iter().any(|a| a.contains(needle.as_str())) {
                return Err(CommandError::Failed {
                    command: cmd.argv.join(" "),
                    status: "exit status: 2".to_string(),
                    output: "make: *** [all] Error 2".to_string(),
                });
            }
        }

        match cmd.argv[0].as_str() {
            "tar" => {
                let archive = Path::new(arg_after(&cmd.argv, "-xf").unwrap_or("source.tar"));
                let dest = Path::new(arg_after(&cmd.argv, "-C").unwrap_or("."));
                let stem = archive
                    .file_name()
                    .map(|n| n.to_string_lossy().split(".tar").next().unwrap_or("src").to_string())
                    .unwrap_or_else(|| "src".to_string());
                std::fs::create_dir_all(dest.join(stem)).expect("Failed to fake extraction");
            }
            "make" if cmd.argv.last().map(String::as_str) == Some("install") => {
                let dir = Path::new(arg_after(&cmd.argv, "-C").unwrap_or("."));
                let name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unknown".to_string());
                let share = self.prefix.join("share").join(&name);
                std::fs::create_dir_all(&share).expect("Failed to fake install");
                std::fs::write(share.join("installed.txt"), &name).expect("Failed to fake install");

                for (_, rel) in self.elf_outputs.iter().filter(|(dir, _)| *dir == name) {
                    let path = self.prefix.join(rel);
                    std::fs::create_dir_all(path.parent().unwrap()).expect("Failed to fake install");
                    std::fs::write(&path, FAKE_ELF).expect("Failed to fake install");
                }
            }
            "objdump" => {
                let inspected = Path::new(cmd.argv.last().map(String::as_str).unwrap_or_default());
                let file_name = inspected
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let dump = self
                    .symbols
                    .iter()
                    .find(|(name, _)| *name == file_name)
                    .map(|(_, dump)| dump.clone())
                    .unwrap_or_default();
                return Ok(CommandOutput::ok(format!(
                    "\n{}:     file format elf64-x86-64\n\nDYNAMIC SYMBOL TABLE:\n{dump}",
                    inspected.display()
                )));
            }
            _ => {}
        }
        Ok(CommandOutput::ok(""))
    }
}

/// Fetcher that writes an empty archive per source into a local directory
pub struct FakeFetcher {
    dir: PathBuf,
    fetched: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).expect("Failed to create fetch dir");
        Self {
            dir: dir.to_path_buf(),
            fetched: RefCell::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }
}

impl SourceFetcher for FakeFetcher {
    fn fetch(&self, source: &ResolvedSource) -> Result<PathBuf, FetchError> {
        self.fetched.borrow_mut().push(source.url.clone());
        let path = self.dir.join(&source.file_name);
        std::fs::write(&path, b"").expect("Failed to write fake archive");
        Ok(path)
    }
}
