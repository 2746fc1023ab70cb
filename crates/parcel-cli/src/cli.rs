//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use parcel_core::SignaturePolicy;

/// parcel - install, upgrade and activate packages from archives
#[derive(Parser, Debug)]
#[command(name = "parcel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file to use instead of the per-user one
    #[arg(long, global = true, env = "PARCEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Write a settings file
    ///
    /// Examples:
    ///   parcel init                          # default archives under the user data dir
    ///   parcel init --root ./pkgs            # everything under ./pkgs
    ///   parcel init -a melpa -a local=/srv/elpa
    Init {
        /// Keep packages and caches under this directory
        #[arg(long)]
        root: Option<PathBuf>,

        /// Archive to use, either a known name or `name=location` (repeatable)
        #[arg(short, long = "archive", value_parser = parse_archive)]
        archives: Vec<ArchiveArg>,

        /// Signature checking policy
        #[arg(long, value_enum)]
        signatures: Option<PolicyArg>,

        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Fetch every archive index
    Refresh,

    /// List packages
    List {
        /// Only installed packages
        #[arg(long, conflicts_with_all = ["available", "upgradeable"])]
        installed: bool,

        /// Only available packages
        #[arg(long, conflicts_with = "upgradeable")]
        available: bool,

        /// Only installed packages with a newer version available
        #[arg(long)]
        upgradeable: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show one package
    Info {
        name: String,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Install a package and what it requires
    Install {
        name: String,

        /// Do not add the package to the selected list
        #[arg(long)]
        dont_select: bool,
    },

    /// Install the package in a local directory
    InstallDir { path: PathBuf },

    /// Delete every installed version of a package
    Delete {
        name: String,

        /// Delete even when other packages require it
        #[arg(short, long)]
        force: bool,
    },

    /// Delete packages nothing selected needs
    Autoremove,

    /// Upgrade one package, or all of them
    Upgrade { name: Option<String> },

    /// Activate every installed package and report failures
    Activate,

    /// List known archives
    Archives,
}

/// An `--archive` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveArg {
    Known(String),
    Custom { name: String, location: String },
}

fn parse_archive(value: &str) -> Result<ArchiveArg, String> {
    match value.split_once('=') {
        Some((name, location)) if !name.is_empty() && !location.is_empty() => Ok(ArchiveArg::Custom {
            name: name.to_string(),
            location: location.to_string(),
        }),
        Some(_) => Err(format!("expected name=location, got '{value}'")),
        None if value.is_empty() => Err("archive name is empty".to_string()),
        None => Ok(ArchiveArg::Known(value.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Required,
    AllowUnsigned,
    Off,
}

impl From<PolicyArg> for SignaturePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Required => SignaturePolicy::Required,
            PolicyArg::AllowUnsigned => SignaturePolicy::AllowUnsigned,
            PolicyArg::Off => SignaturePolicy::Off,
        }
    }
}
