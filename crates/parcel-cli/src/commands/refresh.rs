//! Refresh command implementation

use colored::Colorize;
use parcel_core::{PackageManager, RefreshOutcome};

use crate::error::{CliError, Result};

pub fn run_refresh(manager: &mut PackageManager, runtime: &tokio::runtime::Runtime) -> Result<()> {
    let outcome = runtime.block_on(manager.refresh());
    print_outcome(&outcome);
    if outcome.refreshed.is_empty() && !outcome.failures.is_empty() {
        return Err(CliError::user("no archive could be refreshed"));
    }
    Ok(())
}

pub(crate) fn print_outcome(outcome: &RefreshOutcome) {
    for name in &outcome.refreshed {
        println!("{} {}", "refreshed".green(), name.cyan());
    }
    for (name, error) in &outcome.failures {
        eprintln!("{} {}: {}", "warning:".yellow().bold(), name.cyan(), error);
    }
    println!(
        "{} {} packages available",
        "Total:".dimmed(),
        outcome.descriptors.len()
    );
}
