//! Package descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::MetadataError;
use crate::sexp::Value;
use crate::version::Version;

/// How a package is delivered and laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
    /// One `.el` file served as `<name>-<version>.el`.
    SingleFile,
    /// A tar archive served as `<name>-<version>.tar`.
    Bundle,
    /// A local directory, never fetched from an archive.
    Directory,
    /// Shipped with the host; never installed or deleted.
    Builtin,
}

impl PackageKind {
    /// Parse the kind tag used in archive indexes.
    pub fn from_tag(tag: &str) -> Result<Self, MetadataError> {
        match tag {
            "single" => Ok(Self::SingleFile),
            "tar" => Ok(Self::Bundle),
            "dir" => Ok(Self::Directory),
            "builtin" => Ok(Self::Builtin),
            other => Err(MetadataError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::SingleFile => "single",
            Self::Bundle => "tar",
            Self::Directory => "dir",
            Self::Builtin => "builtin",
        }
    }

    /// Extension of the artifact served by an archive, if any.
    pub fn artifact_extension(&self) -> Option<&'static str> {
        match self {
            Self::SingleFile => Some("el"),
            Self::Bundle => Some("tar"),
            Self::Directory | Self::Builtin => None,
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A dependency on another package at a minimum version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub name: String,
    pub min_version: Version,
}

impl Requirement {
    pub fn new(name: impl Into<String>, min_version: Version) -> Self {
        Self {
            name: name.into(),
            min_version,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}>={}", self.name, self.min_version)
    }
}

/// One version of one package, installed or available.
///
/// Descriptors are values: the `with_*` methods return modified copies.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    name: String,
    version: Version,
    summary: String,
    requirements: Vec<Requirement>,
    kind: PackageKind,
    archive: Option<String>,
    install_dir: Option<PathBuf>,
    signed: bool,
    extras: BTreeMap<String, Value>,
}

impl PackageDescriptor {
    /// Create a descriptor; the name must be usable as a directory name.
    pub fn new(name: impl Into<String>, version: Version, kind: PackageKind) -> Result<Self, MetadataError> {
        let name = name.into();
        parcel_fs::validate_path_identifier(&name)
            .map_err(|e| MetadataError::invalid("package name", e.to_string()))?;
        Ok(Self {
            name,
            version,
            summary: String::new(),
            requirements: Vec::new(),
            kind,
            archive: None,
            install_dir: None,
            signed: false,
            extras: BTreeMap::new(),
        })
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_requirements(mut self, requirements: Vec<Requirement>) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_archive(mut self, archive: impl Into<String>) -> Self {
        self.archive = Some(archive.into());
        self
    }

    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub fn with_kind(mut self, kind: PackageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set one extra property; keys are stored without a leading `:`.
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extras
            .insert(key.trim_start_matches(':').to_string(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn kind(&self) -> PackageKind {
        self.kind
    }

    pub fn archive(&self) -> Option<&str> {
        self.archive.as_deref()
    }

    pub fn install_dir(&self) -> Option<&Path> {
        self.install_dir.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn extras(&self) -> &BTreeMap<String, Value> {
        &self.extras
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    pub fn url(&self) -> Option<&str> {
        self.extra("url").and_then(Value::as_str)
    }

    pub fn keywords(&self) -> Vec<String> {
        self.extra("keywords")
            .and_then(|v| v.unquote().as_list())
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_text)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `<name>-<version>`, also the install directory name.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// File name of the artifact served by an archive.
    pub fn artifact_name(&self) -> Option<String> {
        self.kind
            .artifact_extension()
            .map(|ext| format!("{}.{}", self.full_name(), ext))
    }

    /// Whether this descriptor satisfies `name >= min_version`.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        self.name == requirement.name && self.version >= requirement.min_version
    }

    /// Whether `other` names the same package version from the same place.
    pub fn same_identity(&self, other: &PackageDescriptor) -> bool {
        self.name == other.name && self.version == other.version && self.archive == other.archive
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
