//! CLI command for `lsbroot doctor`
//!
//! Checks host tools and reports issues with suggestions.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{
    is_json, is_quiet, print_detail, print_info, print_json, print_success, print_warning, status,
};
use crate::core::doctor::run_doctor;
use crate::infra::dirs::LsbrootDirs;

/// Execute the doctor command
pub fn execute(root: Option<&Path>) -> Result<()> {
    let report = run_doctor(root, &LsbrootDirs::new());

    if is_json() {
        let status = if report.all_passed() {
            "success"
        } else if report.failed_required().is_empty() {
            "warning"
        } else {
            "error"
        };
        print_json(&serde_json::json!({
            "status": status,
            "checks": report.checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "passed": c.passed,
                "required": c.required,
                "location": c.location,
                "error": c.error,
                "suggestion": c.suggestion
            })).collect::<Vec<_>>(),
            "config_issues": report.config_issues,
            "passed_count": report.passed_count(),
            "total_count": report.checks.len()
        }));

        if !report.failed_required().is_empty() {
            return Err(anyhow::anyhow!("Missing required host tools"));
        }
        return Ok(());
    }

    if is_quiet() {
        let failed_required = report.failed_required();
        if !failed_required.is_empty() {
            for check in failed_required {
                eprintln!("{} Missing required: {}", status::ERROR, check.name);
            }
            return Err(anyhow::anyhow!("Missing required host tools"));
        }
        return Ok(());
    }

    print_info("Checking host tools...");
    println!();

    for check in &report.checks {
        let required_str = if check.required { "" } else { " [optional]" };
        if check.passed {
            let location = check
                .location
                .as_ref()
                .map(|l| format!(" ({l})"))
                .unwrap_or_default();
            println!("  {} {}{location}{required_str}", status::SUCCESS, check.name);
        } else {
            println!("  {} {}{required_str}", status::ERROR, check.name);
            if let Some(suggestion) = &check.suggestion {
                print_detail(&format!("  {suggestion}"));
            }
        }
    }

    if !report.config_issues.is_empty() {
        println!();
        print_warning("Environment issues:");
        for issue in &report.config_issues {
            print_detail(&format!("• {issue}"));
        }
    }

    println!();
    let passed = report.passed_count();
    let total = report.checks.len();
    let failed_required = report.failed_required();

    if report.all_passed() {
        print_success(&format!("All checks passed ({passed}/{total})"));
    } else if failed_required.is_empty() {
        print_warning(&format!(
            "{passed}/{total} checks passed (optional tools missing)"
        ));
    } else {
        println!("{} {passed}/{total} checks passed", status::ERROR);
        return Err(anyhow::anyhow!(
            "Missing required host tools: {}",
            failed_required
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    Ok(())
}
