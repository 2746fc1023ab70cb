//! Install commands

use std::path::Path;

use colored::Colorize;
use parcel_core::{InstallReport, PackageManager};

use super::refresh::print_outcome;
use crate::error::{CliError, Result};

/// Install `name`, refreshing first when no index has ever been fetched.
pub fn run_install(
    manager: &mut PackageManager,
    runtime: &tokio::runtime::Runtime,
    name: &str,
    dont_select: bool,
) -> Result<()> {
    if manager.store().all_available().next().is_none() {
        tracing::info!("no archive index cached, refreshing first");
        print_outcome(&runtime.block_on(manager.refresh()));
    }
    let report = runtime.block_on(manager.install(name, dont_select))?;
    print_report(&report);
    check_report(&report)
}

pub fn run_install_dir(manager: &mut PackageManager, path: &Path) -> Result<()> {
    let installed = manager.install_directory(path)?;
    println!("{} {}", "installed".green(), installed.descriptor.full_name().cyan());
    if let Some(error) = &installed.compile_error {
        eprintln!("{} {}", "warning:".yellow().bold(), error);
    }
    Ok(())
}

pub(crate) fn print_report(report: &InstallReport) {
    for package in &report.installed {
        println!("{} {}", "installed".green(), package.descriptor.full_name().cyan());
        if let Some(error) = &package.compile_error {
            eprintln!("{} {}", "warning:".yellow().bold(), error);
        }
    }
    for name in &report.removed {
        println!("{} {}", "removed".yellow(), name.cyan());
    }
    for name in &report.skipped {
        println!("{} {} (already installed)", "skipped".dimmed(), name);
    }
    for (name, error) in &report.failures {
        eprintln!("{} {}: {}", "failed".red().bold(), name.cyan(), error);
    }
}

pub(crate) fn check_report(report: &InstallReport) -> Result<()> {
    if report.is_complete() {
        Ok(())
    } else {
        Err(CliError::user(format!("{} package(s) failed", report.failures.len())))
    }
}
