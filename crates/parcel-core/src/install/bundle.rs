//! Safe extraction of tar bundles.
//!
//! The whole archive is read and checked before anything touches the disk,
//! so a rejected bundle leaves no files behind.

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tar::EntryType;

use crate::descriptor::PackageDescriptor;
use crate::error::InstallError;

enum Planned {
    Dir(Vec<String>),
    File(Vec<String>, Vec<u8>),
    Symlink(Vec<String>, String),
}

/// Components of `raw` below the package root, or why it is unsafe.
fn entry_components(package: &str, root: &str, raw: &str) -> Result<Vec<String>, InstallError> {
    let unsafe_path = || InstallError::UnsafePath {
        package: package.to_string(),
        entry: raw.to_string(),
    };

    let normalized = raw.replace('\\', "/");
    let has_drive = normalized.as_bytes().get(1) == Some(&b':');
    if normalized.starts_with('/') || has_drive {
        return Err(unsafe_path());
    }

    let mut components = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(unsafe_path()),
            other => components.push(other.to_string()),
        }
    }

    match components.first() {
        Some(first) if first == root => Ok(components.split_off(1)),
        _ => Err(InstallError::BadLayout {
            package: package.to_string(),
            reason: format!("entry '{raw}' is not under '{root}/'"),
        }),
    }
}

type LinkSet<'a> = HashSet<&'a [String]>;

/// Where a link at `location` pointing to `target` lands, relative to the
/// package root.
///
/// `None` when the target leaves the package or passes through one of `links`.
fn resolve_link(location: &[String], target: &str, links: &LinkSet<'_>) -> Option<Vec<String>> {
    let target = target.replace('\\', "/");
    if target.starts_with('/') || target.as_bytes().get(1) == Some(&b':') {
        return None;
    }
    let mut resolved: Vec<String> = location[..location.len().saturating_sub(1)].to_vec();
    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                resolved.pop()?;
            }
            other => {
                resolved.push(other.to_string());
                if links.contains(resolved.as_slice()) {
                    return None;
                }
            }
        }
    }
    Some(resolved)
}

/// Whether a link at `location` pointing to `target` stays inside the package.
fn link_stays_inside(location: &[String], target: &str) -> bool {
    resolve_link(location, target, &LinkSet::new()).is_some()
}

/// Reject entries that would be written through a link from the same bundle.
///
/// Links are created before later entries are written, so a file under a
/// linked directory, or a link whose target crosses another link, could
/// otherwise land outside the package.
fn check_links(package: &str, planned: &[Planned]) -> Result<(), InstallError> {
    let links: LinkSet<'_> = planned
        .iter()
        .filter_map(|item| match item {
            Planned::Symlink(components, _) => Some(components.as_slice()),
            _ => None,
        })
        .collect();
    if links.is_empty() {
        return Ok(());
    }

    for item in planned {
        let (components, target) = match item {
            Planned::Dir(components) | Planned::File(components, _) => (components, None),
            Planned::Symlink(components, target) => (components, Some(target)),
        };
        let through_link = (1..components.len()).any(|n| links.contains(&components[..n]));
        let replaces_link = target.is_none() && links.contains(components.as_slice());
        let escapes = target.is_some_and(|t| resolve_link(components, t, &links).is_none());
        if through_link || replaces_link || escapes {
            let entry = match target {
                Some(t) => format!("{}/{} -> {t}", package, components.join("/")),
                None => format!("{}/{}", package, components.join("/")),
            };
            return Err(InstallError::UnsafePath {
                package: package.to_string(),
                entry,
            });
        }
    }
    Ok(())
}

fn plan(desc: &PackageDescriptor, bytes: &[u8]) -> Result<Vec<Planned>, InstallError> {
    let package = desc.full_name();
    let tar_error = |source: std::io::Error| InstallError::Tar {
        package: package.clone(),
        source,
    };

    let mut archive = tar::Archive::new(Cursor::new(bytes));
    let mut planned = Vec::new();

    for entry in archive.entries().map_err(tar_error)? {
        let mut entry = entry.map_err(tar_error)?;
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::XGlobalHeader | EntryType::XHeader => continue,
            EntryType::Link => {
                return Err(InstallError::UnsafePath {
                    package: package.clone(),
                    entry: format!("{raw} (hard link)"),
                });
            }
            _ => {}
        }

        let components = entry_components(&package, &package, &raw)?;
        match entry_type {
            EntryType::Directory => planned.push(Planned::Dir(components)),
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                if components.is_empty() {
                    return Err(InstallError::BadLayout {
                        package: package.clone(),
                        reason: format!("file entry '{raw}' has no name"),
                    });
                }
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data).map_err(tar_error)?;
                planned.push(Planned::File(components, data));
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name_bytes()
                    .map(|t| String::from_utf8_lossy(&t).into_owned())
                    .unwrap_or_default();
                if components.is_empty() || !link_stays_inside(&components, &target) {
                    return Err(InstallError::UnsafePath {
                        package: package.clone(),
                        entry: format!("{raw} -> {target}"),
                    });
                }
                planned.push(Planned::Symlink(components, target));
            }
            other => {
                return Err(InstallError::BadLayout {
                    package: package.clone(),
                    reason: format!("unsupported entry type {other:?} for '{raw}'"),
                });
            }
        }
    }
    check_links(&package, &planned)?;
    Ok(planned)
}

fn join(dir: &Path, components: &[String]) -> PathBuf {
    components.iter().fold(dir.to_path_buf(), |path, c| path.join(c))
}

/// Validate `bytes` as the bundle for `desc`, then write it to `dir`.
///
/// Returns the regular files written.
pub fn extract(desc: &PackageDescriptor, bytes: &[u8], dir: &Path) -> Result<Vec<PathBuf>, InstallError> {
    let planned = plan(desc, bytes)?;
    let package = desc.full_name();
    let io_error = |path: &Path, e| InstallError::io(&package, path, e);

    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    let mut written = Vec::new();

    for item in planned {
        match item {
            Planned::Dir(components) => {
                let path = join(dir, &components);
                std::fs::create_dir_all(&path).map_err(|e| io_error(&path, e))?;
            }
            Planned::File(components, data) => {
                let path = join(dir, &components);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
                }
                std::fs::write(&path, data).map_err(|e| io_error(&path, e))?;
                tracing::debug!(package = %package, file = %path.display(), "extracted");
                written.push(path);
            }
            Planned::Symlink(components, target) => {
                let path = join(dir, &components);
                write_symlink(&package, &path, &target)?;
            }
        }
    }
    Ok(written)
}

#[cfg(unix)]
fn write_symlink(package: &str, path: &Path, target: &str) -> Result<(), InstallError> {
    if path.symlink_metadata().is_ok() {
        std::fs::remove_file(path).map_err(|e| InstallError::io(package, path, e))?;
    }
    std::os::unix::fs::symlink(target, path).map_err(|e| InstallError::io(package, path, e))
}

#[cfg(not(unix))]
fn write_symlink(package: &str, path: &Path, target: &str) -> Result<(), InstallError> {
    tracing::warn!(package, link = %path.display(), target, "symbolic links are not supported here, skipping");
    Ok(())
}
