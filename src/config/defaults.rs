//! Default configuration values

/// Install prefix directory name, relative to the environment root
pub const PREFIX_DIR: &str = "local";

/// Library directory name inside the prefix
pub const PREFIX_LIB_DIR: &str = "lib";

/// Per-recipe working directories, relative to the environment root
pub const BUILD_DIR: &str = "build";

/// Command log directory, relative to the build directory
pub const LOGS_SUBDIR: &str = "logs";

/// State directory, relative to the environment root
pub const STATE_DIR: &str = ".lsbroot";

/// Install manifest file name inside the state directory
pub const MANIFEST_FILE: &str = "manifest.toml";

/// Session configuration file name, relative to the environment root
pub const CONFIG_FILE: &str = "lsbroot.toml";

/// Install manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Default target identifier
pub const DEFAULT_TARGET: &str = "linux";

/// Shared libraries `lsbcc` links dynamically instead of against LSB stubs
pub const LSB_SHARED_LIBS: &[&str] = &[
    "bz2",
    "crypto",
    "ncurses",
    "ncursesw",
    "python",
    "python2.7",
    "readline",
    "ssl",
];

/// Inclusive symbol-version ceilings of the compatibility baseline
pub const SYMBOL_CEILINGS: &[(&str, &[u32])] = &[("GLIBC", &[2, 3, 4]), ("GLIBCXX", &[3, 4, 7])];

/// Loader token for the directory of the loaded object
pub const ORIGIN_TOKEN: &str = "$ORIGIN";

/// Marker file written next to a verified cached archive
pub const FETCHED_MARKER_SUFFIX: &str = ".fetched";

/// Default number of parallel make jobs
pub fn default_build_jobs() -> usize {
    num_cpus::get().max(1)
}
