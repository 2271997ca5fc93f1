//! Host tool checks
//!
//! Every recipe step shells out to host tools. `lsbroot doctor` reports
//! which of them are reachable on `PATH` before a long build finds out.

use std::path::Path;

use crate::core::config::SessionConfig;
use crate::core::session::load_catalog;
use crate::infra::dirs::LsbrootDirs;

/// Result of a single tool check
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Tool being checked
    pub name: String,
    pub passed: bool,
    /// Resolved location when found
    pub location: Option<String>,
    pub error: Option<String>,
    pub suggestion: Option<String>,
    /// Required tools abort every build when missing
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: &str, location: Option<String>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            location,
            error: None,
            suggestion: None,
            required,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            location: None,
            error: Some(error.to_string()),
            suggestion: suggestion.map(String::from),
            required,
        }
    }
}

/// Overall doctor report
#[derive(Debug, Default)]
pub struct DoctorReport {
    pub checks: Vec<CheckResult>,
    /// Problems with the environment root's configuration
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// Check if all required checks passed
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    /// Check if all checks passed (including optional)
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Get all failed required checks
    pub fn failed_required(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .collect()
    }
}

/// Host tools and what they are used for
///
/// (tool, purpose, required)
pub const HOST_TOOLS: &[(&str, &str, bool)] = &[
    ("make", "building recipes", true),
    ("tar", "extracting source archives", true),
    ("objdump", "symbol-version verification (binutils)", true),
    ("strip", "stripping installed binaries (binutils)", true),
    ("rpm2cpio", "installing the LSB SDK bundle", true),
    ("cpio", "installing the LSB SDK bundle", true),
    ("unzip", "extracting zip source archives", false),
    ("cmake", "CMake-based recipes", false),
    ("patchelf", "rewriting rpaths before the patchelf recipe is built", false),
];

/// Locate `tool` on `PATH`
pub fn check_tool(tool: &str, purpose: &str, required: bool) -> CheckResult {
    match which::which(tool) {
        Ok(path) => CheckResult::pass(tool, Some(path.display().to_string()), required),
        Err(_) => CheckResult::fail(
            tool,
            &format!("{tool} not found in PATH"),
            Some(&format!("Install {tool} with your package manager; needed for {purpose}")),
            required,
        ),
    }
}

/// Validate the configuration and catalog of an environment root
pub fn check_environment(root: &Path, dirs: &LsbrootDirs) -> Vec<String> {
    let mut issues = Vec::new();

    let config = match SessionConfig::load(root) {
        Ok(config) => config,
        Err(e) => {
            issues.push(e.to_string());
            return issues;
        }
    };

    if let Err(e) = config.effective_constraints(Vec::new()) {
        issues.push(e.to_string());
    }
    if let Some(dir) = config.catalog_dir(root) {
        if !dir.is_dir() {
            issues.push(format!("Catalog directory '{}' does not exist", dir.display()));
        }
    }
    if let Err(e) = load_catalog(root, &config, dirs) {
        issues.push(e.to_string());
    }

    issues
}

/// Run all doctor checks
pub fn run_doctor(root: Option<&Path>, dirs: &LsbrootDirs) -> DoctorReport {
    let mut report = DoctorReport::new();

    for (tool, purpose, required) in HOST_TOOLS {
        report.add_check(check_tool(tool, purpose, *required));
    }

    if let Some(root) = root {
        for issue in check_environment(root, dirs) {
            report.add_config_issue(issue);
        }
    }

    report
}
