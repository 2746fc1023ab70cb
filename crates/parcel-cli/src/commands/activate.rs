//! Activate command implementation

use colored::Colorize;
use parcel_core::{InitReport, PackageManager};

use crate::error::{CliError, Result};

/// Report what startup activation did.
pub fn run_activate(manager: &PackageManager, report: &InitReport) -> Result<()> {
    for name in &report.activation.activated {
        let version = manager
            .activation()
            .activated(name)
            .map(|d| d.version().to_string())
            .unwrap_or_default();
        println!("{} {} {}", "active".green(), name.cyan(), version.dimmed());
    }
    for (name, error) in &report.activation.failures {
        eprintln!("{} {}: {}", "failed".red().bold(), name.cyan(), error);
    }
    if !report.activation.is_complete() {
        return Err(CliError::user(format!(
            "{} package(s) could not be activated",
            report.activation.failures.len()
        )));
    }
    println!();
    println!(
        "{} {} load path entries",
        "Total:".dimmed(),
        manager.activation().host().load_path().len()
    );
    Ok(())
}
