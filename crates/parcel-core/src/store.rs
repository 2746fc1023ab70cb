//! In-memory indexes of installed, built-in and available packages.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use crate::compat::{CompatMode, CompatibilityIndex};
use crate::descriptor::{PackageDescriptor, PackageKind, Requirement};
use crate::error::{InstallError, MetadataError};
use crate::hold::HoldPolicy;
use crate::metadata;
use crate::version::Version;

/// Name of the built-in package that stands for the host program.
pub const DEFAULT_HOST: &str = "emacs";

type Index = BTreeMap<String, Vec<PackageDescriptor>>;

/// Every package the manager knows about.
///
/// Each index maps a name to a non-empty list. `installed` and `builtin`
/// are sorted by decreasing version; `available` is sorted by archive
/// priority, then by decreasing version.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorStore {
    installed: Index,
    builtin: Index,
    available: Index,
    archive_order: Vec<String>,
    selected: Vec<String>,
    host: String,
    compat_mode: CompatMode,
    compat: OnceLock<CompatibilityIndex>,
}

/// An install directory that could not be read at load time.
#[derive(Debug)]
pub struct LoadFailure {
    pub dir: std::path::PathBuf,
    pub error: MetadataError,
}

fn insert_sorted(index: &mut Index, desc: PackageDescriptor) {
    let list = index.entry(desc.name().to_string()).or_default();
    list.retain(|d| d.version() != desc.version() || d.archive() != desc.archive());
    list.push(desc);
    list.sort_by(|a, b| b.version().cmp(a.version()));
}

impl DescriptorStore {
    /// A store whose only built-in package is the host at `host_version`.
    pub fn new(host: impl Into<String>, host_version: Version) -> Self {
        let host = host.into();
        let mut store = Self {
            installed: Index::new(),
            builtin: Index::new(),
            available: Index::new(),
            archive_order: Vec::new(),
            selected: Vec::new(),
            host: host.clone(),
            compat_mode: CompatMode::default(),
            compat: OnceLock::new(),
        };
        if let Ok(desc) = PackageDescriptor::new(host, host_version, PackageKind::Builtin) {
            store.add_builtin(desc);
        }
        store
    }

    pub fn with_compat_mode(mut self, mode: CompatMode) -> Self {
        self.compat_mode = mode;
        self.compat = OnceLock::new();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    // ---- built-in ----

    pub fn add_builtin(&mut self, desc: PackageDescriptor) {
        insert_sorted(&mut self.builtin, desc.with_kind(PackageKind::Builtin));
        self.compat = OnceLock::new();
    }

    pub fn builtin(&self, name: &str) -> &[PackageDescriptor] {
        self.builtin.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin.contains_key(name)
    }

    // ---- installed ----

    /// Read every `<root>/<dir>/<name>-pkg.el`.
    ///
    /// Directories without a description file are ignored; unreadable
    /// descriptions are returned as [`LoadFailure`]s and skipped.
    pub fn load_installed(&mut self, root: &Path) -> Result<Vec<LoadFailure>, InstallError> {
        let mut failures = Vec::new();
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "install root does not exist yet");
            return Ok(failures);
        }

        let entries = std::fs::read_dir(root).map_err(|e| InstallError::io("store", root, e))?;
        let mut dirs: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let Some(description) = find_description_file(&dir) else {
                tracing::debug!(dir = %dir.display(), "no description file, skipping");
                continue;
            };
            let text = match std::fs::read_to_string(&description) {
                Ok(text) => text,
                Err(e) => {
                    return Err(InstallError::io("store", &description, e));
                }
            };
            match metadata::parse_description_file(&text) {
                Ok(desc) => {
                    let signed = dir
                        .join(format!(
                            "{}.{}",
                            desc.full_name(),
                            parcel_fs::PackageFile::SignedExtension
                        ))
                        .is_file();
                    tracing::debug!(package = %desc, "loaded installed package");
                    self.insert_installed(desc.with_install_dir(&dir).with_signed(signed));
                }
                Err(error) => {
                    tracing::warn!(dir = %dir.display(), %error, "unreadable package description");
                    failures.push(LoadFailure { dir, error });
                }
            }
        }
        Ok(failures)
    }

    pub fn insert_installed(&mut self, desc: PackageDescriptor) {
        insert_sorted(&mut self.installed, desc);
    }

    /// Forget one installed version; returns it if it was present.
    pub fn remove_installed(&mut self, name: &str, version: &Version) -> Option<PackageDescriptor> {
        let list = self.installed.get_mut(name)?;
        let idx = list.iter().position(|d| d.version() == version)?;
        let removed = list.remove(idx);
        if list.is_empty() {
            self.installed.remove(name);
        }
        Some(removed)
    }

    pub fn installed(&self, name: &str) -> &[PackageDescriptor] {
        self.installed.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.contains_key(name)
    }

    /// Every installed descriptor, by name then decreasing version.
    pub fn all_installed(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.installed.values().flatten()
    }

    /// Newest installed version satisfying `req`.
    pub fn find_installed(&self, req: &Requirement) -> Option<&PackageDescriptor> {
        self.installed(&req.name).iter().find(|d| d.satisfies(req))
    }

    /// Whether an installed or built-in package already meets `req`.
    pub fn satisfied_locally(&self, req: &Requirement) -> bool {
        self.find_installed(req).is_some() || self.builtin(&req.name).iter().any(|d| d.satisfies(req))
    }

    // ---- available ----

    /// Replace the whole available index.
    ///
    /// `archive_order` is the configured archive list; its order decides
    /// priority between archives serving the same name.
    pub fn replace_available(&mut self, descriptors: Vec<PackageDescriptor>, archive_order: &[String]) {
        let rank = |archive: Option<&str>| {
            archive
                .and_then(|a| archive_order.iter().position(|o| o == a))
                .unwrap_or(usize::MAX)
        };

        let mut index = Index::new();
        for desc in descriptors {
            let list = index.entry(desc.name().to_string()).or_default();
            if !list.iter().any(|d: &PackageDescriptor| d.same_identity(&desc)) {
                list.push(desc);
            }
        }
        for list in index.values_mut() {
            list.sort_by(|a, b| {
                (rank(a.archive()), a.archive(), Reverse(a.version()))
                    .cmp(&(rank(b.archive()), b.archive(), Reverse(b.version())))
            });
        }

        self.available = index;
        self.archive_order = archive_order.to_vec();
        self.compat = OnceLock::new();
    }

    pub fn available(&self, name: &str) -> &[PackageDescriptor] {
        self.available.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn all_available(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.available.values().flatten()
    }

    pub fn archive_order(&self) -> &[String] {
        &self.archive_order
    }

    /// Best descriptor for `name`: the first unblocked candidate that can
    /// run on this host, else the first unblocked one.
    pub fn best_available(&self, name: &str, holds: &HoldPolicy) -> Option<&PackageDescriptor> {
        let compat = self.compatibility();
        let mut unblocked = self
            .available(name)
            .iter()
            .filter(|d| holds.blocks(d).is_none())
            .peekable();
        let first = unblocked.peek().copied();
        unblocked.find(|d| compat.is_compatible(d)).or(first)
    }

    // ---- compatibility ----

    /// Built on first use after any change to `available` or `builtin`.
    pub fn compatibility(&self) -> &CompatibilityIndex {
        self.compat
            .get_or_init(|| CompatibilityIndex::build(&self.available, &self.builtin, self.compat_mode))
    }

    // ---- selection ----

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn set_selected(&mut self, names: Vec<String>) {
        self.selected.clear();
        for name in names {
            self.select(&name);
        }
    }

    /// Mark `name` as explicitly installed; returns false if it already was.
    pub fn select(&mut self, name: &str) -> bool {
        if self.selected.iter().any(|s| s == name) {
            return false;
        }
        self.selected.push(name.to_string());
        true
    }

    pub fn deselect(&mut self, name: &str) -> bool {
        let before = self.selected.len();
        self.selected.retain(|s| s != name);
        before != self.selected.len()
    }

    // ---- derived queries ----

    /// Installed packages with a requirement on `name`.
    pub fn reverse_dependencies(&self, name: &str) -> Vec<&PackageDescriptor> {
        self.all_installed()
            .filter(|d| d.name() != name && d.requirements().iter().any(|r| r.name == name))
            .collect()
    }

    /// Installed packages that are neither selected nor required, directly or
    /// transitively, by a selected package.
    pub fn removable(&self) -> Vec<&PackageDescriptor> {
        let mut needed: BTreeSet<&str> = BTreeSet::new();
        let mut queue: Vec<&str> = self.selected.iter().map(String::as_str).collect();
        while let Some(name) = queue.pop() {
            if !needed.insert(name) {
                continue;
            }
            for desc in self.installed(name) {
                queue.extend(desc.requirements().iter().map(|r| r.name.as_str()));
            }
        }
        self.all_installed()
            .filter(|d| !needed.contains(d.name()))
            .collect()
    }

    /// Installed packages with a newer available version the holds allow.
    ///
    /// Local directory installs are never upgraded.
    pub fn upgradeable(&self, holds: &HoldPolicy) -> Vec<(&PackageDescriptor, &PackageDescriptor)> {
        let compat = self.compatibility();
        self.installed
            .values()
            .filter_map(|versions| versions.first())
            .filter(|current| current.kind() != PackageKind::Directory)
            .filter_map(|current| {
                self.available(current.name())
                    .iter()
                    .filter(|c| holds.blocks(c).is_none() && c.version() > current.version())
                    .filter(|c| compat.is_compatible(c))
                    .max_by(|a, b| a.version().cmp(b.version()))
                    .map(|newer| (current, newer))
            })
            .collect()
    }
}

fn find_description_file(dir: &Path) -> Option<std::path::PathBuf> {
    let suffix = parcel_fs::PackageFile::DescriptionSuffix.as_str();
    let mut matches: Vec<_> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}
