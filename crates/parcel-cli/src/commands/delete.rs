//! Delete and autoremove commands

use colored::Colorize;
use parcel_core::{Error, PackageManager};

use crate::error::{CliError, Result};

pub fn run_delete(manager: &mut PackageManager, name: &str, force: bool) -> Result<()> {
    let removed = manager.delete(name, force).map_err(|e| match e {
        Error::InUse { package, dependents } => CliError::user(format!(
            "package '{package}' is used by {} (use --force to delete anyway)",
            dependents.join(", ")
        )),
        other => other.into(),
    })?;
    for full_name in removed {
        println!("{} {}", "deleted".yellow(), full_name.cyan());
    }
    Ok(())
}

pub fn run_autoremove(manager: &mut PackageManager) -> Result<()> {
    let removed = manager.autoremove()?;
    if removed.is_empty() {
        println!("{}", "Nothing to remove".dimmed());
    }
    for full_name in removed {
        println!("{} {}", "deleted".yellow(), full_name.cyan());
    }
    Ok(())
}
