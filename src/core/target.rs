//! Target definitions
//!
//! A target is the architecture- and prefix-specific toolchain description
//! shared by every recipe in a session. Targets are selected by identifier
//! and expose a fixed capability set through the [`Target`] trait; recipes
//! only ever hold a reference to their resolved target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::defaults;
use crate::core::compat::SymbolConstraint;
use crate::error::ConfigError;

/// Architecture selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Arch {
    /// 32-bit x86
    #[serde(rename = "32bit")]
    Bits32,
    /// 64-bit x86
    #[serde(rename = "64bit")]
    Bits64,
}

impl Arch {
    /// Compiler switch selecting the bit width
    pub fn compiler_switch(self) -> &'static str {
        match self {
            Arch::Bits32 => "-m32",
            Arch::Bits64 => "-m64",
        }
    }

    /// Canonical selector string
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Bits32 => "32bit",
            Arch::Bits64 => "64bit",
        }
    }

    /// Architecture of the running host, falling back to 64bit
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86" => Arch::Bits32,
            _ => Arch::Bits64,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "32bit" | "32" | "i386" | "i686" | "x86" => Ok(Arch::Bits32),
            "64bit" | "64" | "x86_64" | "amd64" => Ok(Arch::Bits64),
            _ => Err(ConfigError::InvalidArch {
                value: s.to_string(),
            }),
        }
    }
}

/// Compiler and linker selection for one architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerFlags {
    pub cc: String,
    pub cxx: String,
    pub ldflags: String,
    pub cflags: String,
    pub cxxflags: String,
}

impl CompilerFlags {
    /// Variable name / value pairs, in the order native tools list them
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("CC", self.cc.clone()),
            ("CXX", self.cxx.clone()),
            ("LDFLAGS", self.ldflags.clone()),
            ("CFLAGS", self.cflags.clone()),
            ("CXXFLAGS", self.cxxflags.clone()),
        ]
    }
}

/// Capability set every target implements
pub trait Target: fmt::Debug + Send + Sync {
    /// Target identifier (as written in `lsbroot.toml`)
    fn id(&self) -> &'static str;

    /// Selected architecture
    fn arch(&self) -> Arch;

    /// Install prefix all recipes write into
    fn prefix(&self) -> &Path;

    /// Recipes the environment itself needs before any user recipe builds
    fn dependencies(&self) -> Vec<String>;

    /// `CC`, `CXX`, `LDFLAGS`, `CFLAGS`, `CXXFLAGS`
    fn compiler_flags(&self) -> CompilerFlags;

    /// Search-path and toolchain-discovery variables
    fn path_variables(&self) -> Vec<(String, String)>;

    /// Directories placed at the front of `PATH`, in order
    fn executable_paths(&self) -> Vec<PathBuf>;

    /// Symbol-version ceilings enforced on installed artifacts
    fn default_constraints(&self) -> Vec<SymbolConstraint>;

    /// Extra C++ flags needed by CMake-driven recipes
    fn cmake_cxxflags(&self) -> Option<String> {
        None
    }
}

/// Identifiers accepted by [`resolve_target`]
pub const SUPPORTED_TARGETS: &[&str] = &["linux", "host"];

/// Resolve a target by identifier
pub fn resolve_target(id: &str, arch: Arch, prefix: PathBuf) -> Result<Box<dyn Target>, ConfigError> {
    match id {
        "linux" | "linux-lsb" => Ok(Box::new(LsbLinuxTarget::new(arch, prefix))),
        "host" => Ok(Box::new(HostTarget::new(arch, prefix))),
        other => Err(ConfigError::UnknownTarget {
            name: other.to_string(),
            supported: SUPPORTED_TARGETS.iter().map(ToString::to_string).collect(),
        }),
    }
}

fn join_prefix(prefix: &Path, rel: &str) -> String {
    prefix.join(rel).display().to_string()
}

/// Linux target building against the Linux Standard Base SDK
///
/// Binaries are compiled with `lsbcc`/`lsbc++` against the LSB stub
/// libraries so they only reference runtime symbols the LSB guarantees.
/// The SDK keeps its stubs in an architecture-dependent directory next to
/// the regular `lib` directory of the prefix.
#[derive(Debug, Clone)]
pub struct LsbLinuxTarget {
    arch: Arch,
    prefix: PathBuf,
}

impl LsbLinuxTarget {
    pub fn new(arch: Arch, prefix: PathBuf) -> Self {
        Self { arch, prefix }
    }

    /// LSB stub library directory, relative to the prefix
    pub fn lsb_libdir(&self) -> &'static str {
        match self.arch {
            Arch::Bits32 => "opt/lsb/lib",
            Arch::Bits64 => "opt/lsb/lib64",
        }
    }

    fn base_flags(&self) -> String {
        format!("-fPIC -Os -D_GNU_SOURCE -DNDEBUG {}", self.arch.compiler_switch())
    }
}

impl Target for LsbLinuxTarget {
    fn id(&self) -> &'static str {
        "linux"
    }

    fn arch(&self) -> Arch {
        self.arch
    }

    fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["bin_lsbsdk".to_string(), "patchelf".to_string()]
    }

    fn compiler_flags(&self) -> CompilerFlags {
        let switch = self.arch.compiler_switch();

        // --lsb-besteffort lets the binary pick the system loader at runtime
        // instead of hard-coding the LSB one.
        let ldflags = format!(
            "{switch} --lsb-besteffort -L{}",
            join_prefix(&self.prefix, "lib")
        );

        let cflags = ["include", "include/ncurses"]
            .iter()
            .fold(self.base_flags(), |acc, dir| {
                format!("{acc} -I{}", join_prefix(&self.prefix, dir))
            });

        let cxxflags = format!("{} -I{}", self.base_flags(), join_prefix(&self.prefix, "include"));

        CompilerFlags {
            cc: format!("lsbcc {switch}"),
            cxx: format!("lsbc++ {switch}"),
            ldflags,
            cflags,
            cxxflags,
        }
    }

    fn path_variables(&self) -> Vec<(String, String)> {
        let lib = join_prefix(&self.prefix, "lib");
        let lsb_lib = join_prefix(&self.prefix, self.lsb_libdir());
        let lsb_include = join_prefix(&self.prefix, "opt/lsb/include");
        let sysroot = self.prefix.display().to_string();

        vec![
            ("LD_LIBRARY_PATH".to_string(), lib.clone()),
            (
                "PKG_CONFIG_PATH".to_string(),
                format!(
                    "{}:{}",
                    join_prefix(&self.prefix, "lib/pkgconfig"),
                    join_prefix(&self.prefix, &format!("{}/pkgconfig", self.lsb_libdir()))
                ),
            ),
            (
                "PKG_CONFIG_SYSROOT_DIR".to_string(),
                sysroot.trim_end_matches('/').to_string(),
            ),
            ("PKG_CONFIG_LIBDIR".to_string(), format!("{lib}:{lsb_lib}")),
            ("LSBCC_LIBS".to_string(), lsb_lib),
            ("LSBCC_INCLUDES".to_string(), lsb_include.clone()),
            ("LSBCXX_INCLUDES".to_string(), lsb_include),
            ("LSB_SHAREDLIBPATH".to_string(), lib),
            (
                "LSBCC_SHAREDLIBS".to_string(),
                defaults::LSB_SHARED_LIBS.join(":"),
            ),
        ]
    }

    fn executable_paths(&self) -> Vec<PathBuf> {
        vec![self.prefix.join("bin"), self.prefix.join("opt/lsb/bin")]
    }

    fn default_constraints(&self) -> Vec<SymbolConstraint> {
        SymbolConstraint::defaults()
    }

    fn cmake_cxxflags(&self) -> Option<String> {
        Some(format!("-I{}", join_prefix(&self.prefix, "opt/lsb/include/c++")))
    }
}

/// Plain host-compiler target
///
/// Uses the host `cc`/`c++` and performs no symbol-version enforcement.
/// Useful for throwaway environments that never leave the build machine.
#[derive(Debug, Clone)]
pub struct HostTarget {
    arch: Arch,
    prefix: PathBuf,
}

impl HostTarget {
    pub fn new(arch: Arch, prefix: PathBuf) -> Self {
        Self { arch, prefix }
    }
}

impl Target for HostTarget {
    fn id(&self) -> &'static str {
        "host"
    }

    fn arch(&self) -> Arch {
        self.arch
    }

    fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["patchelf".to_string()]
    }

    fn compiler_flags(&self) -> CompilerFlags {
        let switch = self.arch.compiler_switch();
        let base = format!("-fPIC -O2 -DNDEBUG {switch} -I{}", join_prefix(&self.prefix, "include"));
        CompilerFlags {
            cc: format!("cc {switch}"),
            cxx: format!("c++ {switch}"),
            ldflags: format!("{switch} -L{}", join_prefix(&self.prefix, "lib")),
            cflags: base.clone(),
            cxxflags: base,
        }
    }

    fn path_variables(&self) -> Vec<(String, String)> {
        let lib = join_prefix(&self.prefix, "lib");
        vec![
            ("LD_LIBRARY_PATH".to_string(), lib.clone()),
            (
                "PKG_CONFIG_PATH".to_string(),
                join_prefix(&self.prefix, "lib/pkgconfig"),
            ),
            (
                "PKG_CONFIG_SYSROOT_DIR".to_string(),
                self.prefix.display().to_string().trim_end_matches('/').to_string(),
            ),
            ("PKG_CONFIG_LIBDIR".to_string(), lib),
        ]
    }

    fn executable_paths(&self) -> Vec<PathBuf> {
        vec![self.prefix.join("bin")]
    }

    fn default_constraints(&self) -> Vec<SymbolConstraint> {
        Vec::new()
    }
}
