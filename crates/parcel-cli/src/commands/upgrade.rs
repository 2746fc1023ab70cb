//! Upgrade command implementation

use colored::Colorize;
use parcel_core::PackageManager;

use super::install::{check_report, print_report};
use crate::error::Result;

/// Upgrade `name`, or every upgradeable package when `None`.
pub fn run_upgrade(
    manager: &mut PackageManager,
    runtime: &tokio::runtime::Runtime,
    name: Option<&str>,
) -> Result<()> {
    let report = match name {
        Some(name) => runtime.block_on(manager.upgrade(name))?,
        None => runtime.block_on(manager.upgrade_all())?,
    };
    if report.installed.is_empty() && report.failures.is_empty() {
        println!("{}", "All packages are up to date".green());
        return Ok(());
    }
    print_report(&report);
    check_report(&report)
}
