//! Command implementations for parcel-cli

pub mod activate;
pub mod delete;
pub mod init;
pub mod install;
pub mod list;
pub mod refresh;
pub mod upgrade;

use std::path::{Path, PathBuf};

use colored::Colorize;
use parcel_core::{InitReport, PackageManager, Settings};

use crate::error::Result;

pub use activate::run_activate;
pub use delete::{run_autoremove, run_delete};
pub use init::run_init;
pub use install::{run_install, run_install_dir};
pub use list::{ListFilter, run_archives, run_info, run_list};
pub use refresh::run_refresh;
pub use upgrade::run_upgrade;

/// The settings file named on the command line, or the per-user default.
pub fn settings_path(config: Option<&Path>) -> PathBuf {
    config.map(Path::to_path_buf).unwrap_or_else(Settings::default_path)
}

/// Load settings, build the manager and activate what is installed.
pub fn open(config: &Path) -> Result<(PackageManager, InitReport)> {
    let settings = Settings::load(config)?;
    let mut manager = PackageManager::new(settings)?.with_settings_path(config);
    let report = manager.initialize()?;
    for failure in &report.load_failures {
        eprintln!(
            "{} skipped {}: {}",
            "warning:".yellow().bold(),
            failure.dir.display(),
            failure.error
        );
    }
    Ok((manager, report))
}

/// Runtime for the async manager operations.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}
