//! parcel CLI
//!
//! The command-line interface for installing and activating packages.

mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use commands::ListFilter;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    tracing::debug!("Verbose mode enabled");

    match cli.command {
        Some(cmd) => execute_command(cmd, &commands::settings_path(cli.config.as_deref())),
        None => {
            println!("{} package manager", "parcel".green().bold());
            println!();
            println!("Run {} for available commands.", "parcel --help".cyan());
            Ok(())
        }
    }
}

fn execute_command(cmd: Commands, config: &std::path::Path) -> Result<()> {
    match cmd {
        Commands::Init {
            root,
            archives,
            signatures,
            force,
        } => commands::run_init(config, root.as_deref(), &archives, signatures.map(Into::into), force),
        Commands::Archives => {
            let settings = parcel_core::Settings::load(config)?;
            commands::run_archives(&settings)
        }
        Commands::Activate => {
            let (manager, report) = commands::open(config)?;
            commands::run_activate(&manager, &report)
        }
        Commands::Refresh => {
            let (mut manager, _) = commands::open(config)?;
            commands::run_refresh(&mut manager, &commands::runtime()?)
        }
        Commands::List {
            installed,
            available,
            upgradeable,
            json,
        } => {
            let (manager, _) = commands::open(config)?;
            commands::run_list(&manager, ListFilter::from_flags(installed, available, upgradeable), json)
        }
        Commands::Info { name, json } => {
            let (manager, _) = commands::open(config)?;
            commands::run_info(&manager, &name, json)
        }
        Commands::Install { name, dont_select } => {
            let (mut manager, _) = commands::open(config)?;
            commands::run_install(&mut manager, &commands::runtime()?, &name, dont_select)
        }
        Commands::InstallDir { path } => {
            let (mut manager, _) = commands::open(config)?;
            commands::run_install_dir(&mut manager, &path)
        }
        Commands::Delete { name, force } => {
            let (mut manager, _) = commands::open(config)?;
            commands::run_delete(&mut manager, &name, force)
        }
        Commands::Autoremove => {
            let (mut manager, _) = commands::open(config)?;
            commands::run_autoremove(&mut manager)
        }
        Commands::Upgrade { name } => {
            let (mut manager, _) = commands::open(config)?;
            commands::run_upgrade(&mut manager, &commands::runtime()?, name.as_deref())
        }
    }
}
