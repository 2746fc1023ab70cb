//! Init command implementation

use std::path::Path;

use colored::Colorize;
use parcel_core::{ArchiveRegistry, ArchiveSource, Settings, SignaturePolicy};

use crate::cli::ArchiveArg;
use crate::error::{CliError, Result};

/// Write a fresh settings file at `config`.
pub fn run_init(
    config: &Path,
    root: Option<&Path>,
    archives: &[ArchiveArg],
    signatures: Option<SignaturePolicy>,
    force: bool,
) -> Result<()> {
    if config.exists() && !force {
        return Err(CliError::user(format!(
            "{} already exists (use --force to overwrite)",
            config.display()
        )));
    }

    let mut settings = match root {
        Some(root) => Settings::rooted_at(&std::path::absolute(root)?),
        None => Settings::default(),
    };
    if !archives.is_empty() {
        settings.archives = resolve_archives(archives)?;
    }
    if let Some(policy) = signatures {
        settings.core.signature_policy = policy;
    }
    settings.save(config)?;
    // Load it back so a bad archive list is reported now
    Settings::load(config)?;

    println!("{} {}", "Wrote".green().bold(), config.display());
    println!("{}:  {}", "Packages".dimmed(), settings.core.install_root.display());
    println!("{}:  {}", "Archives".dimmed(), settings.archive_names().join(", ").cyan());
    println!();
    println!("Run {} to fetch the archive indexes.", "parcel refresh".cyan());
    Ok(())
}

fn resolve_archives(args: &[ArchiveArg]) -> Result<Vec<ArchiveSource>> {
    let registry = ArchiveRegistry::with_known();
    args.iter()
        .map(|arg| match arg {
            ArchiveArg::Known(name) => registry.get(name).map(|known| known.source()).ok_or_else(|| {
                CliError::user(format!(
                    "unknown archive '{name}'. Known: {}. Use name=location for others.",
                    registry.known_archives().join(", ")
                ))
            }),
            ArchiveArg::Custom { name, location } => Ok(ArchiveSource::new(name, location)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_rooted_settings() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        let archives = [
            ArchiveArg::Known("melpa".to_string()),
            ArchiveArg::Custom {
                name: "local".to_string(),
                location: "/srv/elpa".to_string(),
            },
        ];

        run_init(
            &config,
            Some(temp.path()),
            &archives,
            Some(SignaturePolicy::Required),
            false,
        )
        .unwrap();

        let settings = Settings::load(&config).unwrap();
        assert_eq!(settings.archive_names(), vec!["melpa", "local"]);
        assert_eq!(settings.core.install_root, temp.path().join("packages"));
        assert_eq!(settings.core.signature_policy, SignaturePolicy::Required);
    }

    #[test]
    fn refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        run_init(&config, Some(temp.path()), &[], None, false).unwrap();

        let err = run_init(&config, Some(temp.path()), &[], None, false).unwrap_err();
        assert!(matches!(err, CliError::User { .. }));
        run_init(&config, Some(temp.path()), &[], None, true).unwrap();
    }

    #[test]
    fn unknown_archive_name() {
        let err = resolve_archives(&[ArchiveArg::Known("nowhere".to_string())]).unwrap_err();
        assert!(err.to_string().contains("gnu"));
    }

    #[test]
    fn duplicate_archive_is_rejected() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        let archives = [
            ArchiveArg::Known("gnu".to_string()),
            ArchiveArg::Known("gnu".to_string()),
        ];

        assert!(matches!(
            run_init(&config, Some(temp.path()), &archives, None, false),
            Err(CliError::Core(parcel_core::Error::Config(_)))
        ));
    }
}
